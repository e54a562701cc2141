use dataset_drivers::store::FsShardStore;
use dataset_drivers::testing::{
    assert_exact_coverage, init_logging, numbered_records, read_all_shards,
};
use dataset_drivers::*;
use std::path::Path;

fn config(out: &Path, num_shards: usize, num_samples: Option<usize>) -> ShardConfig {
    ShardConfig {
        identifier: "numbers".into(),
        version: 1,
        num_shards,
        output_data_url: out.join("shards").to_string_lossy().into_owned(),
        output_catalog_url: out.join("catalog.yaml").to_string_lossy().into_owned(),
        num_samples,
    }
}

fn written(cfg: &ShardConfig) -> anyhow::Result<Vec<Vec<Record>>> {
    let url = &cfg.output_data_url;
    let store = FsShardStore::existing(url, url, store::DEFAULT_EXTENSION)?;
    Ok(read_all_shards(&store)?.into_values().collect())
}

#[test]
fn twenty_three_records_into_five_shards() -> anyhow::Result<()> {
    init_logging();
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path(), 5, None);
    let input = numbered_records(23);

    let report = SaveShards::new().save_stream(&cfg, RecordStream::from_records(input.clone()))?;
    assert_eq!(report.records, 23);
    assert!(report.shard_keys.len() <= 5);
    assert!(report.catalog_key.is_none());

    let shards = written(&cfg)?;
    assert_eq!(shards.iter().map(Vec::len).sum::<usize>(), 23);
    assert_exact_coverage(&input, &shards);
    Ok(())
}

#[test]
fn num_samples_takes_source_prefix() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path(), 5, Some(10));
    let input = numbered_records(23);

    let report = SaveShards::new().save_stream(&cfg, RecordStream::from_records(input.clone()))?;
    assert_eq!(report.records, 10);
    assert_exact_coverage(&input[..10], &written(&cfg)?);

    // Same prefix on a second run, even with a different engine layout.
    let again = config(&tmp.path().join("again"), 3, Some(10));
    SaveShards::new()
        .with_runner(Runner::parallel(Some(2), Some(7)))
        .save_stream(&again, RecordStream::from_records(input.clone()))?;
    assert_exact_coverage(&input[..10], &written(&again)?);
    Ok(())
}

#[test]
fn more_shards_than_records_skips_empty_partitions() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path(), 8, None);
    let input = numbered_records(3);

    let report = SaveShards::new().save_stream(&cfg, RecordStream::from_records(input.clone()))?;
    assert_eq!(report.shard_keys.len(), 3);

    let shards = written(&cfg)?;
    assert!(shards.len() <= 3);
    assert_exact_coverage(&input, &shards);
    Ok(())
}

#[test]
fn coverage_holds_for_every_shard_count() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = numbered_records(17);
    for n in 1..=17 {
        let cfg = config(&tmp.path().join(n.to_string()), n, None);
        for runner in [Runner::sequential(), Runner::parallel(Some(3), Some(4))] {
            let report = SaveShards::new()
                .with_runner(runner)
                .save_stream(&cfg, RecordStream::from_records(input.clone()))?;
            assert_eq!(report.records, 17);
            assert_exact_coverage(&input, &written(&cfg)?);
        }
    }
    Ok(())
}

#[test]
fn zero_records_never_create_output() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path(), 4, None);

    let report = SaveShards::new().save_stream(&cfg, RecordStream::empty())?;
    assert_eq!(report.records, 0);
    assert!(report.shard_keys.is_empty());
    assert!(!Path::new(&cfg.output_data_url).exists());
    Ok(())
}

#[test]
fn hooks_run_before_sharding() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path(), 2, None);
    let hooks = HookChain::new()
        .with(Hook::filter("even", |r: &Record| r["id"].as_u64().is_some_and(|i| i % 2 == 0)))
        .with(Hook::map("tag", |mut r: Record| {
            r.insert("tagged".into(), true.into());
            r
        }));

    let report = SaveShards::new()
        .with_hooks(hooks)
        .save_stream(&cfg, RecordStream::from_records(numbered_records(10)))?;
    assert_eq!(report.records, 5);

    let shards = written(&cfg)?;
    for r in shards.iter().flatten() {
        assert_eq!(r["id"].as_u64().map(|i| i % 2), Some(0));
        assert_eq!(r["tagged"], serde_json::json!(true));
    }
    Ok(())
}

#[cfg(feature = "compression-zstd")]
#[test]
fn store_extension_selects_codec() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = config(tmp.path(), 2, None);
    SaveShards::new()
        .with_stores(Stores::new().with_extension("jsonl.zst"))
        .save_stream(&cfg, RecordStream::from_records(numbered_records(4)))?;

    let first = Path::new(&cfg.output_data_url).join("shard_0.jsonl.zst");
    let bytes = std::fs::read(first)?;
    assert_eq!(&bytes[..4], &[0x28, 0xb5, 0x2f, 0xfd]);
    Ok(())
}
