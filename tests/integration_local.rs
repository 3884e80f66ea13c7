//! End-to-end synchronization against a local copy of the target

use blockfetch::cancel::CancelFlag;
use blockfetch::config::Config;
use blockfetch::delta::DataRange;
use blockfetch::error::{Error, Phase, Result};
use blockfetch::recipe::{generate_recipe, generate_recipe_from_bytes, write_recipe, Recipe};
use blockfetch::source::{
    load_recipe, open_source, resolve_data_location, FetchedRange, FileSource, RangeSource,
};
use blockfetch::sync::{CompletionReport, SyncEngine};
use blockfetch::uri::Location;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Deterministic pseudo-random bytes
fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

/// Create a test file with specified content
fn create_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Names of leftover temporary files in `dir`
fn part_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".part"))
        .collect()
}

fn quiet_config() -> Config {
    Config {
        progress: false,
        ..Config::default()
    }
}

fn sync(
    recipe: Recipe,
    remote: &Path,
    seed: Option<&Path>,
    target: &Path,
    config: Config,
) -> Result<CompletionReport> {
    let mut source = FileSource::open(remote).unwrap();
    SyncEngine::new(recipe, &mut source, config).run(seed, target)
}

#[test]
fn test_identical_file_needs_no_fetch() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(64 * 1024, 1);
    let remote = create_file(&dir, "remote.bin", &data);
    let target = create_file(&dir, "file.bin", &data);
    let recipe = generate_recipe_from_bytes(&data, 1024);

    let report = sync(recipe, &remote, Some(&target), &target, quiet_config()).unwrap();

    assert_eq!(fs::read(&target).unwrap(), data);
    assert_eq!(report.blocks_found, report.blocks_total);
    assert_eq!(report.bytes_local, data.len() as u64);
    assert_eq!(report.bytes_fetched, 0);
    assert_eq!(report.range_requests, 0);
    assert!(!report.full_download);
}

#[test]
fn test_partial_update_fetches_only_changes() {
    let dir = TempDir::new().unwrap();
    let old = pseudo_random(200 * 1024, 2);

    // An edit in the middle and an insertion near the end
    let mut new = old.clone();
    new[50_000..50_600].copy_from_slice(&pseudo_random(600, 3));
    new.splice(150_000..150_000, pseudo_random(333, 4));

    let remote = create_file(&dir, "remote.bin", &new);
    let target = create_file(&dir, "file.bin", &old);
    let recipe = generate_recipe_from_bytes(&new, 2048);

    let report = sync(recipe, &remote, Some(&target), &target, quiet_config()).unwrap();

    assert_eq!(fs::read(&target).unwrap(), new);
    assert!(!report.full_download);
    assert!(report.bytes_fetched > 0);
    assert!(report.bytes_fetched < 10 * 2048);
    assert_eq!(report.bytes_local + report.bytes_fetched, new.len() as u64);
    assert!(report.savings_percent() > 90.0);

    // The old version was kept
    let backup = report.backup.unwrap();
    assert_eq!(backup, dir.path().join("file.bin.zs-old"));
    assert_eq!(fs::read(backup).unwrap(), old);
    assert!(part_files(dir.path()).is_empty());
}

#[test]
fn test_recipe_download_included_in_received_bytes() {
    let dir = TempDir::new().unwrap();
    let old = pseudo_random(32 * 1024, 21);
    let mut new = old.clone();
    new[10_000..10_100].copy_from_slice(&pseudo_random(100, 22));

    let remote = create_file(&dir, "remote.bin", &new);
    let target = create_file(&dir, "file.bin", &old);
    let recipe = generate_recipe_from_bytes(&new, 1024);

    let mut source = FileSource::open(&remote).unwrap();
    let report = SyncEngine::new(recipe, &mut source, quiet_config())
        .recipe_bytes(4321)
        .run(Some(&target), &target)
        .unwrap();

    assert_eq!(fs::read(&target).unwrap(), new);
    assert_eq!(report.recipe_bytes, 4321);
    assert_eq!(report.bytes_received, report.bytes_fetched + 4321);
    assert!(report.overhead_percent().unwrap() > 0.0);
}

#[test]
fn test_seed_with_trailing_copy() {
    let dir = TempDir::new().unwrap();
    let remote = create_file(&dir, "remote.bin", b"ABCDEFGH");
    let seed = create_file(&dir, "seed.bin", b"ABCDEFGHAB");
    let target = dir.path().join("out.bin");
    let recipe = generate_recipe_from_bytes(b"ABCDEFGH", 4);

    let report = sync(recipe, &remote, Some(&seed), &target, quiet_config()).unwrap();

    assert_eq!(fs::read(&target).unwrap(), b"ABCDEFGH");
    assert_eq!(report.blocks_found, 2);
    assert_eq!(report.bytes_fetched, 0);
    assert!(report.backup.is_none());
    // The seed is left alone when it is not the output
    assert_eq!(fs::read(&seed).unwrap(), b"ABCDEFGHAB");
}

#[test]
fn test_isolated_match_falls_back_to_full_download() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(8 * 512, 5);

    // Only target block 2 exists locally, surrounded by unrelated bytes
    let mut local = pseudo_random(700, 6);
    local.extend_from_slice(&data[1024..1536]);
    local.extend_from_slice(&pseudo_random(900, 7));

    let remote = create_file(&dir, "remote.bin", &data);
    let seed = create_file(&dir, "seed.bin", &local);
    let target = dir.path().join("out.bin");
    let recipe = generate_recipe_from_bytes(&data, 512);

    let config = Config {
        sequence_validation: Some(true),
        ..quiet_config()
    };
    let report = sync(recipe, &remote, Some(&seed), &target, config).unwrap();

    assert_eq!(fs::read(&target).unwrap(), data);
    assert!(report.full_download);
    assert_eq!(report.blocks_found, 0);
    assert_eq!(report.bytes_fetched, data.len() as u64);
    assert_eq!(report.range_requests, 1);
}

#[test]
fn test_isolated_match_kept_without_sequence_validation() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(8 * 512, 5);

    let mut local = pseudo_random(700, 6);
    local.extend_from_slice(&data[1024..1536]);

    let remote = create_file(&dir, "remote.bin", &data);
    let seed = create_file(&dir, "seed.bin", &local);
    let target = dir.path().join("out.bin");
    let recipe = generate_recipe_from_bytes(&data, 512);

    let config = Config {
        sequence_validation: Some(false),
        ..quiet_config()
    };
    let report = sync(recipe, &remote, Some(&seed), &target, config).unwrap();

    assert_eq!(fs::read(&target).unwrap(), data);
    assert!(!report.full_download);
    assert_eq!(report.blocks_found, 1);
    assert_eq!(report.bytes_local, 512);
    // Blocks 0-1 and 3-7 as two merged ranges in one request
    assert_eq!(report.range_requests, 1);
}

#[test]
fn test_missing_seed_downloads_whole_file() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(10_000, 8);
    let remote = create_file(&dir, "remote.bin", &data);
    let target = dir.path().join("out.bin");
    let recipe = generate_recipe_from_bytes(&data, 1024);

    let report = sync(recipe, &remote, Some(&target), &target, quiet_config()).unwrap();

    assert_eq!(fs::read(&target).unwrap(), data);
    assert!(report.full_download);
    assert!(report.backup.is_none());
}

#[test]
fn test_empty_seed_downloads_whole_file() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(3000, 9);
    let remote = create_file(&dir, "remote.bin", &data);
    let seed = create_file(&dir, "seed.bin", b"");
    let target = dir.path().join("out.bin");

    let report = sync(
        generate_recipe_from_bytes(&data, 1024),
        &remote,
        Some(&seed),
        &target,
        quiet_config(),
    )
    .unwrap();

    assert!(report.full_download);
    assert_eq!(fs::read(&target).unwrap(), data);
}

#[test]
fn test_integrity_failure_leaves_target_untouched() {
    let dir = TempDir::new().unwrap();
    let expected = pseudo_random(5000, 10);
    let served = pseudo_random(5000, 11);
    let remote = create_file(&dir, "remote.bin", &served);
    let target = create_file(&dir, "file.bin", b"previous version");

    let err = sync(
        generate_recipe_from_bytes(&expected, 1024),
        &remote,
        None,
        &target,
        quiet_config(),
    )
    .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Verify));
    assert!(matches!(err.root(), Error::Integrity { .. }));
    assert_eq!(fs::read(&target).unwrap(), b"previous version");
    assert!(!dir.path().join("file.bin.zs-old").exists());
    assert!(part_files(dir.path()).is_empty());
}

/// Answers every batch in reverse order
struct ReversingSource(FileSource);

impl RangeSource for ReversingSource {
    fn fetch_ranges(&mut self, ranges: &[DataRange]) -> Result<Vec<FetchedRange>> {
        let mut fetched = self.0.fetch_ranges(ranges)?;
        fetched.reverse();
        Ok(fetched)
    }

    fn fetch_whole(&mut self, out: &mut dyn Write) -> Result<u64> {
        self.0.fetch_whole(out)
    }

    fn bytes_received(&self) -> u64 {
        self.0.bytes_received()
    }

    fn requests(&self) -> usize {
        self.0.requests()
    }
}

#[test]
fn test_out_of_order_source_is_rejected() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(6 * 256, 12);

    // Blocks 1-2 present locally, so blocks 0 and 3-5 become two ranges
    let mut local = pseudo_random(100, 13);
    local.extend_from_slice(&data[256..768]);

    let remote = create_file(&dir, "remote.bin", &data);
    let seed = create_file(&dir, "seed.bin", &local);
    let target = dir.path().join("out.bin");

    let mut source = ReversingSource(FileSource::open(&remote).unwrap());
    let err = SyncEngine::new(generate_recipe_from_bytes(&data, 256), &mut source, quiet_config())
        .run(Some(&seed), &target)
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Fetch));
    assert!(matches!(err.root(), Error::RangeOrder { .. }));
    assert!(!target.exists());
    assert!(part_files(dir.path()).is_empty());
}

#[test]
fn test_small_batches_reconstruct_correctly() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(32 * 128, 14);

    // Every other pair of blocks survives locally
    let mut local = Vec::new();
    for pair in data.chunks(256).step_by(2) {
        local.extend_from_slice(pair);
        local.extend_from_slice(&pseudo_random(37, pair[0] as u32));
    }

    let remote = create_file(&dir, "remote.bin", &data);
    let seed = create_file(&dir, "seed.bin", &local);
    let target = dir.path().join("out.bin");

    let config = Config {
        max_ranges: Some(2),
        ..quiet_config()
    };
    let report = sync(
        generate_recipe_from_bytes(&data, 128),
        &remote,
        Some(&seed),
        &target,
        config,
    )
    .unwrap();

    assert_eq!(fs::read(&target).unwrap(), data);
    // Eight missing pairs, at most two blocks per request
    assert_eq!(report.range_requests, 8);
    assert_eq!(report.bytes_fetched, 16 * 128);
}

#[test]
fn test_backup_settings() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(4096, 15);
    let remote = create_file(&dir, "remote.bin", &data);

    let target = create_file(&dir, "a.bin", b"old a");
    let config = Config {
        backup_suffix: ".prev".to_string(),
        ..quiet_config()
    };
    let report = sync(generate_recipe_from_bytes(&data, 1024), &remote, None, &target, config).unwrap();
    assert_eq!(report.backup, Some(dir.path().join("a.bin.prev")));
    assert_eq!(fs::read(dir.path().join("a.bin.prev")).unwrap(), b"old a");

    let target = create_file(&dir, "b.bin", b"old b");
    let config = Config {
        backup: false,
        ..quiet_config()
    };
    let report = sync(generate_recipe_from_bytes(&data, 1024), &remote, None, &target, config).unwrap();
    assert!(report.backup.is_none());
    assert!(!dir.path().join("b.bin.zs-old").exists());
    assert_eq!(fs::read(&target).unwrap(), data);
}

#[test]
fn test_modification_time_applied() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(2000, 16);
    let remote = create_file(&dir, "remote.bin", &data);
    let target = dir.path().join("out.bin");

    let mut recipe = generate_recipe_from_bytes(&data, 512);
    recipe.mtime = Some(1_500_000_000);
    let expected = recipe.modification_time().unwrap();

    sync(recipe, &remote, None, &target, quiet_config()).unwrap();
    assert_eq!(fs::metadata(&target).unwrap().modified().unwrap(), expected);
}

#[test]
fn test_cancelled_run_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let data = pseudo_random(4096, 17);
    let remote = create_file(&dir, "remote.bin", &data);
    let target = create_file(&dir, "file.bin", &data[..2048]);

    let cancel = CancelFlag::new();
    cancel.cancel();

    let mut source = FileSource::open(&remote).unwrap();
    let err = SyncEngine::new(generate_recipe_from_bytes(&data, 512), &mut source, quiet_config())
        .cancel(cancel)
        .run(Some(&target), &target)
        .unwrap_err();

    assert!(matches!(err.root(), Error::Cancelled));
    assert_eq!(fs::read(&target).unwrap(), &data[..2048]);
    assert!(part_files(dir.path()).is_empty());
}

#[test]
fn test_recipe_file_with_relative_url() {
    let dir = TempDir::new().unwrap();
    let old = pseudo_random(50_000, 18);
    let mut new = old.clone();
    new.truncate(45_000);
    new.extend_from_slice(&pseudo_random(7000, 19));

    let remote = create_file(&dir, "release.img", &new);
    let target = create_file(&dir, "local.img", &old);

    let mut recipe = generate_recipe(&remote, 1024).unwrap();
    assert_eq!(recipe.filename, "release.img");
    recipe.url = Some("release.img".to_string());
    let recipe_path = dir.path().join("release.img.bfr");
    write_recipe(&recipe, &recipe_path).unwrap();

    let config = quiet_config();
    let recipe_location = Location::Local(recipe_path);
    let loaded = load_recipe(&recipe_location, &config).unwrap();
    assert_eq!(loaded.bytes_downloaded, 0);
    let recipe = loaded.recipe;
    let data_location = resolve_data_location(&recipe_location, &recipe, None).unwrap();
    assert_eq!(data_location, Location::Local(remote.clone()));

    let mut source = open_source(&data_location, &config).unwrap();
    let report = SyncEngine::new(recipe, source.as_mut(), config)
        .run(Some(&target), &target)
        .unwrap();

    assert_eq!(fs::read(&target).unwrap(), new);
    assert!(report.bytes_local >= 44_000);
}
