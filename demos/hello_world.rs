use kv_vfs::{DirStore, VfsConfig, VfsEvent, VirtualFileSystem};

fn main() {
    let tmp = std::env::temp_dir();
    println!("Temp dir: {}", tmp.display());

    let root = tmp.join("my_kv_vfs");

    // creates `/tmp/my_kv_vfs` on host; every entry becomes one file in it
    let mut store = DirStore::with_capacity(&root, 64 * 1024).unwrap();
    // remove the stored values and the created directory when `fs` is dropped
    store.set_auto_clean(true);

    // finishes any interrupted rename/delete and creates `/Documents`, `/Desktop`, `/Pictures`
    let mut fs = VirtualFileSystem::new(store, VfsConfig::default()).unwrap();
    let events = fs.subscribe();

    fs.write("/Documents/first.txt", "Hello", None).unwrap();
    fs.mkdir("/Documents/drafts").unwrap();
    fs.write("/Documents/drafts/second.txt", "World", None).unwrap();

    // only direct children: `first.txt` and `drafts`, not `second.txt`
    for entry in fs.list("/Documents").unwrap() {
        println!("{:?} {}", entry.kind(), entry.path());
    }

    // moves the whole subtree
    fs.rename("/Documents", "/Archive").unwrap();
    assert!(!fs.exists("/Documents/first.txt"));

    let first = fs.read("/Archive/first.txt").unwrap();
    let second = fs.read("/Archive/drafts/second.txt").unwrap();
    println!(
        "{}, {}!",
        first.text().unwrap_or_default(),
        second.text().unwrap_or_default()
    );

    // a write larger than the store allows is refused and reported
    let huge = "x".repeat(128 * 1024);
    if let Err(e) = fs.write("/Archive/huge.txt", huge, None) {
        println!("write failed: {} ({})", e, e.reason());
    }
    if let Ok(VfsEvent::CapacityExceeded { path }) = events.try_recv() {
        println!("storage full while writing {path}");
    }

    // removes children first, then the directory itself
    fs.delete("/Archive").unwrap();
    println!("search 'second': {} hit(s)", fs.search("second").unwrap().len());
}
