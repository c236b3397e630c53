use std::cmp::Ordering;

use weft::{WeftError, WeftPath};

#[test]
fn parse_round_trips() {
    let path = WeftPath::parse("/a/b/c").unwrap();
    assert_eq!(path.components().collect::<Vec<_>>(), ["a", "b", "c"]);
    assert_eq!(path.to_string(), "/a/b/c");
    assert_eq!(WeftPath::parse(&path.to_string()).unwrap(), path);
}

#[test]
fn parse_collapses_separators() {
    let path = WeftPath::parse("//x///y/").unwrap();
    assert_eq!(path.components().collect::<Vec<_>>(), ["x", "y"]);
    assert_eq!(path.to_string(), "/x/y");
}

#[test]
fn parse_root() {
    let root = WeftPath::parse("/").unwrap();
    assert!(root.is_root());
    assert_eq!(root, WeftPath::root());
    assert_eq!(root.to_string(), "/");
    assert_eq!(root.components().count(), 0);
    assert!(root.parent().is_none());
    assert!(root.last().is_none());
}

#[test]
fn parse_rejects_bad_strings() {
    for bad in ["", "a/b", "/a:b", ":"] {
        assert!(
            matches!(WeftPath::parse(bad), Err(WeftError::Argument(_))),
            "expected argument error for {:?}",
            bad
        );
    }
}

#[test]
fn child_appends_and_validates() {
    let base = WeftPath::parse("/a").unwrap();
    assert_eq!(base.child("b").unwrap().to_string(), "/a/b");
    for bad in ["", "x/y", "x:y"] {
        assert!(
            matches!(base.child(bad), Err(WeftError::Argument(_))),
            "expected argument error for component {:?}",
            bad
        );
    }
}

#[test]
fn parent_and_last() {
    let path = WeftPath::parse("/a/b/c").unwrap();
    assert_eq!(path.last(), Some("c"));
    let parent = path.parent().unwrap();
    assert_eq!(parent.to_string(), "/a/b");
    assert_eq!(parent.parent().unwrap().parent().unwrap(), WeftPath::root());
}

#[test]
fn subpath_is_component_wise() {
    let a = WeftPath::parse("/a").unwrap();
    let ab = WeftPath::parse("/a/b").unwrap();
    assert!(ab.is_subpath(&a));
    assert!(!a.is_subpath(&ab));
    assert!(a.is_subpath(&a));

    // "/a" is a string prefix of "/ab" but not a component prefix.
    let slab = WeftPath::parse("/ab").unwrap();
    assert!(!slab.is_subpath(&a));
}

#[test]
fn ordering_puts_ancestors_first() {
    let a = WeftPath::parse("/a").unwrap();
    let ab = WeftPath::parse("/a/b").unwrap();
    let ac = WeftPath::parse("/a/c").unwrap();

    assert_eq!(a.cmp(&ab), Ordering::Less);
    assert_eq!(ab.cmp(&a), Ordering::Greater);
    assert_eq!(ac.cmp(&ab), Ordering::Greater);
    assert_eq!(ab.cmp(&ab.clone()), Ordering::Equal);
    assert_eq!(WeftPath::root().cmp(&a), Ordering::Less);

    let mut paths = vec![ac.clone(), ab.clone(), a.clone(), WeftPath::root()];
    paths.sort();
    assert_eq!(paths, vec![WeftPath::root(), a, ab, ac]);
}

#[test]
fn serde_uses_string_form() {
    let path = WeftPath::parse("/a/b").unwrap();
    let wire = serde_json::to_string(&path).unwrap();
    assert_eq!(wire, "\"/a/b\"");
    let back: WeftPath = serde_json::from_str(&wire).unwrap();
    assert_eq!(back, path);

    assert!(serde_json::from_str::<WeftPath>("\"a:b\"").is_err());
}

#[test]
fn to_local_joins_components() {
    let path = WeftPath::parse("/a/b/c.txt").unwrap();
    let local = path.to_local(std::path::Path::new("/tmp/root"));
    assert_eq!(local, std::path::PathBuf::from("/tmp/root/a/b/c.txt"));
}
