use rerouter_core::cache::{purge, CacheEntry, CacheStore};
use std::collections::BTreeMap;
use std::fs;
use std::thread;

fn entry(url: &str, body: &str, ttl: u64) -> CacheEntry {
    let mut header = BTreeMap::new();
    header.insert("Content-Type".to_string(), "text/html".to_string());
    CacheEntry::new(url, 200, header, body.as_bytes().to_vec(), ttl)
}

#[test]
fn query_variants_live_in_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    let plain = "https://b.example/list";
    let page1 = "https://b.example/list?page=1";
    let page2 = "https://b.example/list?page=2";

    for (url, body) in [(plain, "all"), (page1, "one"), (page2, "two")] {
        store.put(url, &entry(url, body, 60)).unwrap();
    }

    assert_eq!(store.get(plain).unwrap().body, b"all");
    assert_eq!(store.get(page1).unwrap().body, b"one");
    assert_eq!(store.get(page2).unwrap().body, b"two");

    let list_dir = dir.path().join("b.example").join("list");
    let mut names: Vec<String> = fs::read_dir(&list_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"index.json".to_string()));
    assert!(names
        .iter()
        .filter(|n| n.as_str() != "index.json")
        .all(|n| n.starts_with("index.") && n.ends_with(".json") && n.len() == "index.12345678.json".len()));
}

#[test]
fn entry_file_is_plain_json() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    let url = "https://b.example/doc";
    let path = store.put(url, &entry(url, "<p>x</p>", 60)).unwrap();

    let raw: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    assert_eq!(raw["url"], url);
    assert_eq!(raw["status"], 200);
    assert_eq!(raw["header"]["Content-Type"], "text/html");
    assert_eq!(raw["body"], "PHA+eDwvcD4=");
    assert!(raw["expires_at"].as_i64().unwrap() > raw["created_at"].as_i64().unwrap());
}

#[test]
fn concurrent_writers_leave_one_complete_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    let url = "https://b.example/race";

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let body = format!("writer-{i}-").repeat(512);
                store.put(url, &entry(url, &body, 60)).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let got = store.get(url).expect("readable entry");
    let text = String::from_utf8(got.body).unwrap();
    let prefix = &text[.."writer-0-".len()];
    assert_eq!(text, prefix.repeat(512));
    assert_eq!(store.list_all().count(), 1);
}

#[test]
fn partial_purge_matches_raw_or_absolute_and_skips_junk() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    for url in [
        "https://b.example/blog/one",
        "https://b.example/blog/two?x=1",
        "https://b.example/about",
    ] {
        store.put(url, &entry(url, "x", 60)).unwrap();
    }
    let junk = dir.path().join("b.example").join("junk.json");
    fs::write(&junk, b"not json").unwrap();

    let res = purge(&store, "https://b.example", "blog", true).unwrap();
    assert_eq!(res.deleted, 2);
    assert_eq!(res.files.len(), 2);
    assert!(store.get("https://b.example/about").is_some());
    assert!(junk.exists());
}

#[test]
fn exact_purge_reports_the_removed_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    let url = "https://b.example/blog/one";
    let path = store.put(url, &entry(url, "x", 60)).unwrap();

    let res = purge(&store, "https://b.example", "https://b.example/blog/one", false).unwrap();
    assert_eq!(res.deleted, 1);
    assert_eq!(res.files, vec![path.display().to_string()]);

    let again = purge(&store, "https://b.example", "/blog/one", false).unwrap();
    assert_eq!(again.deleted, 0);
}
