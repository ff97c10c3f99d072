use assetsync_core::deficiency::{DeficiencyRecord, DEFICIENCY_FILE};
use assetsync_core::hash::ObjectHash;
use assetsync_core::logical_path::LogicalPath;

#[test]
fn empty_record_writes_nothing() {
    let td = tempfile::tempdir().unwrap();
    let rec = DeficiencyRecord::new("1.16");
    assert_eq!(rec.persist(td.path()).unwrap(), None);
    assert!(!td.path().join(DEFICIENCY_FILE).exists());
}

#[test]
fn document_shape_and_overwrite() {
    let td = tempfile::tempdir().unwrap();
    let h1 = ObjectHash::of_bytes(b"one");
    let h2 = ObjectHash::of_bytes(b"two");

    let mut first = DeficiencyRecord::new("1.16");
    first.insert(&LogicalPath::parse("a/b.png").unwrap(), &h1);
    first.insert(&LogicalPath::parse("c.ogg").unwrap(), &h2);
    let path = first.persist(td.path()).unwrap().unwrap();

    let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(
        doc,
        serde_json::json!({
            "version": "1.16",
            "files": { "a/b.png": h1.as_str(), "c.ogg": h2.as_str() }
        })
    );

    let mut second = DeficiencyRecord::new("1.17");
    second.insert(&LogicalPath::parse("z.txt").unwrap(), &h2);
    second.persist(td.path()).unwrap();

    let back = DeficiencyRecord::load(&path).unwrap();
    assert_eq!(back, second);
}
