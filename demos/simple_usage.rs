/// Complete index store API demo
///
/// Demonstrates the major operations:
/// - Opening a store from settings (connection string, local cache)
/// - Index lifecycle (verify, create, clean)
/// - Alias resolution to sub indexes
/// - Reading and writing through cached directory handles
/// - Write locks
/// - Replication into a second store

use indexstore::directory::dir::{read_file, write_file};
use indexstore::index::meta::WRITE_LOCK_NAME;
use indexstore::wrapper::local_cache::LocalCacheDirectory;
use indexstore::{IndexStore, MappingEntry, StoreSettings};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║      Index Store - Complete API Demo          ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Open a ram-backed store
    println!("Step 1: OPEN - Building the store...");
    let mappings = [
        MappingEntry::new("posts", &["posts", "archive"]),
        MappingEntry::new("drafts", &["drafts", "archive"]),
    ];
    let settings = StoreSettings::new("ram://demo").with_local_cache("posts", 4 * 1024 * 1024);
    let store = IndexStore::open(settings, &mappings)?;
    println!("  {store}\n");

    // Step 2: VERIFY - Create whatever is missing
    println!("Step 2: VERIFY - Creating missing indexes...");
    let created = store.verify_index()?;
    println!("  created: {created}");
    println!("  exists now: {}\n", store.index_exists()?);

    // Step 3: ALIASES - Resolve aliases to sub indexes
    println!("Step 3: ALIASES - Resolving alias selections...");
    let for_posts = store.calc_sub_indexes(None, Some(&["posts"]))?;
    println!("  alias 'posts' covers: {for_posts:?}");
    println!(
        "  'archive' is shared by {} aliases\n",
        store.number_of_aliases_for("archive")
    );

    // Step 4: WRITE / READ - Work through a cached handle
    println!("Step 4: WRITE / READ - Using a directory handle...");
    let dir = store.open_directory("posts")?;
    write_file(dir.as_ref(), "seg_1.bin", b"first segment")?;
    let bytes = read_file(dir.as_ref(), "seg_1.bin")?;
    println!("  wrote and read back {} bytes", bytes.len());

    // Read again so the local cache overlay serves the second hit.
    read_file(dir.as_ref(), "seg_1.bin")?;
    if let Some(cached) = dir.as_any().downcast_ref::<LocalCacheDirectory>() {
        let stats = cached.stats();
        println!(
            "  local cache: {} hits / {} misses, {} bytes cached\n",
            stats.hit_count, stats.miss_count, stats.cached_bytes
        );
    }

    // Step 5: LOCKS - Take and release the write lock
    println!("Step 5: LOCKS - Write lock round trip...");
    let mut lock = dir.make_lock(WRITE_LOCK_NAME)?;
    lock.try_acquire()?;
    println!("  store locked: {}", store.is_locked()?);
    store.release_locks()?;
    println!("  after release: {}\n", store.is_locked()?);

    // Step 6: REPLICATION - Copy everything into a filesystem store
    println!("Step 6: REPLICATION - Copying into a filesystem store...");
    let tmp = tempfile::tempdir()?;
    let dest = IndexStore::open(
        StoreSettings::new(format!("file://{}", tmp.path().display())),
        &mappings,
    )?;
    dest.copy_from(&store)?;
    let dest_dir = dest.open_directory("posts")?;
    println!("  destination exists: {}", dest.index_exists()?);
    println!(
        "  replicated files: {:?}\n",
        dest_dir.list_files()?
    );

    // Step 7: CLEAN - Reset one partition
    println!("Step 7: CLEAN - Resetting the drafts partition...");
    store.clean_index_for("drafts")?;
    println!(
        "  drafts exists and is empty again: {}\n",
        store.index_exists_for("drafts")?
    );

    // Step 8: CLOSE - Shut both stores down
    println!("Step 8: CLOSE - Shutting down...");
    dest.close();
    store.close();
    println!("  done");

    println!("\n╔════════════════════════════════════════╗");
    println!("║     All API Operations Completed!      ║");
    println!("╚════════════════════════════════════════╝\n");

    Ok(())
}
