//! End-to-end tests: log directory → published snapshot

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use vbd_common::{snapshot, RunRecord};
use vbd_ingest::{extract_file, CorpusBuilder};

const FINETUNE_LOG: &str = "\
2024-01-05 10:00:00 INFO: full set of arguments: {'model': 'deit_small_patch16_224', 'task': 'fine-tune', 'world_size': 2, 'batch_size': 64, 'epochs': 3, 'resume': None, 'amp': True}
2024-01-05 10:00:00 INFO: full set of old arguments: {'task': 'pre-train', 'world_size': 8, 'batch_size': 128, 'lr': 0.0005, 'aug': 'three'}
2024-01-05 10:00:01 INFO: training on 2 GPUs -> NVIDIA A100-SXM4-40GB
2024-01-05 10:00:01 INFO: starting run with experiment_id=7
2024-01-05 10:00:02 INFO: Run name: 'deit_small_fine-tune_05.01.2024_10:00:02'
2024-01-05 10:05:00 INFO: epoch 0: loss=2.1, acc1=51.5, acc5=80.0, time=150s, validation_time=20s, val_acc1=50.0
2024-01-05 10:10:00 INFO: epoch 1: loss=1.7, acc1=66.0, acc5=88.0, time=150s, validation_time=20s, val_acc1=64.0
2024-01-05 10:15:00 INFO: epoch 2: loss=1.4, acc1=72.5, acc5=91.0, time=150s, validation_time=20s, val_acc1=71.0
2024-01-05 10:15:30 INFO: Efficiency metrics: flops=4600000000, number of parameters=22050664
2024-01-05 10:15:31 INFO: Efficiency metrics: {'throughput': {'value': 2100.0, 'batch_size': 256}, 'peak_memory_total': 8123}
";

const EVAL_LOG: &str = "\
INFO: full set of arguments: {'task': 'eval', 'model': 'swin_tiny_window7_224', 'world_size': 1, 'batch_size': 256}
INFO: full set of old arguments: {'task': 'fine-tune', 'model': 'swin_tiny', 'dataset': 'imagenet'}
INFO: Run name: 'swin_tiny_eval_06.01.2024_09:00:00'
INFO: Metrics: {'val_acc1': 0.81, 'val_acc5': 0.95}
";

fn write_logs(dir: &Path, logs: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    for (name, text) in logs {
        fs::write(dir.join(name), text).unwrap();
    }
}

fn builder(root: &Path) -> CorpusBuilder {
    CorpusBuilder::new(
        root.join("logging"),
        root.join("data").join("data.json"),
        4,
        Duration::from_secs(10),
    )
    .unwrap()
}

#[test]
fn test_finetune_log_extraction() {
    let dir = tempfile::tempdir().unwrap();
    write_logs(dir.path(), &[("ft.log", FINETUNE_LOG)]);

    let record = extract_file(&dir.path().join("ft.log")).unwrap();

    assert_eq!(record.run_date.as_deref(), Some("05.01.2024 10:00:02"));
    assert_eq!(record.device.as_deref(), Some("NVIDIA A100-SXM4-40GB"));
    assert_eq!(record.experiment_id, Some(7));
    assert_eq!(record.extra["resume"], Value::Null);

    // Times scaled by the two devices, then summed
    assert_eq!(record.epoch_data[&2]["time"], json!(300.0));
    assert_eq!(record.epoch_data[&2]["time_sum"], json!(900.0));
    assert_eq!(record.epoch_data[&2]["validation_time_sum"], json!(120.0));

    // Accuracies logged in percent
    assert_eq!(record.extra["top_acc1"], json!(0.725));
    assert_eq!(record.extra["top_val_acc1"], json!(0.71));
    assert_eq!(record.final_epoch, Some(2));

    // Both phases get global batch sizes
    assert_eq!(record.batch_size, Some(128));
    assert_eq!(record.local_batch_size, Some(64));
    assert_eq!(record.extra["pre-train_batch_size"], json!(1024));
    assert_eq!(record.extra["pre-train_local_batch_size"], json!(128));
    assert_eq!(record.extra["pre-train_aug"], json!("three"));

    assert_eq!(record.extra["throughput_value"], json!(2100.0));
    assert_eq!(record.extra["peak_memory_total"], json!(8123));
    assert_eq!(record.extra["number of parameters"], json!(22050664));
}

#[test]
fn test_eval_log_takes_old_arguments_unprefixed() {
    let dir = tempfile::tempdir().unwrap();
    write_logs(dir.path(), &[("eval.log", EVAL_LOG)]);

    let record = extract_file(&dir.path().join("eval.log")).unwrap();

    assert_eq!(record.task.as_deref(), Some("eval"));
    assert_eq!(record.model.as_deref(), Some("swin_tiny_window7_224"));
    assert_eq!(record.extra["dataset"], json!("imagenet"));
    assert_eq!(record.extra["val_acc1"], json!(0.81));
    assert!(record.epoch_data.is_empty());
    assert_eq!(record.batch_size, Some(256));
}

#[tokio::test]
async fn test_corpus_skips_corrupt_and_nameless_logs() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logging");
    write_logs(
        &logs,
        &[
            ("a_finetune.log", FINETUNE_LOG),
            ("b_eval.log", EVAL_LOG),
            ("c_corrupt.log", "INFO: Run name: broken_01.01.2024_00:00:00\n"),
            ("d_started.log", "INFO: full set of arguments: {'model': 'vit_base'}\n"),
            ("notes.txt", FINETUNE_LOG),
        ],
    );

    let builder = builder(dir.path());
    let report = builder.build_once().unwrap();

    assert_eq!(report.files, 4);
    assert_eq!(report.records, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(report.discarded, 1);

    let corpus: Vec<RunRecord> = snapshot::load(builder.snapshot_path()).await.unwrap();
    assert_eq!(corpus.len(), 2);
    assert!(corpus.iter().all(RunRecord::has_run_name));
}

#[test]
fn test_unchanged_logs_publish_identical_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    write_logs(
        &dir.path().join("logging"),
        &[("a.log", FINETUNE_LOG), ("b.log", EVAL_LOG)],
    );

    let builder = builder(dir.path());
    builder.build_once().unwrap();
    let first = fs::read(builder.snapshot_path()).unwrap();
    builder.build_once().unwrap();
    let second = fs::read(builder.snapshot_path()).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_snapshot_is_replaced_whole() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logging");
    write_logs(&logs, &[("a.log", FINETUNE_LOG), ("b.log", EVAL_LOG)]);

    let builder = builder(dir.path());
    builder.build_once().unwrap();

    fs::remove_file(logs.join("a.log")).unwrap();
    builder.build_once().unwrap();

    let corpus: Vec<RunRecord> = snapshot::load(builder.snapshot_path()).await.unwrap();
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus[0].task.as_deref(), Some("eval"));
}

#[tokio::test]
async fn test_abandoned_temp_file_does_not_affect_readers() {
    let dir = tempfile::tempdir().unwrap();
    write_logs(&dir.path().join("logging"), &[("a.log", FINETUNE_LOG)]);

    let builder = builder(dir.path());
    builder.build_once().unwrap();

    // A publish interrupted mid-write leaves only a partial temp file behind
    let partial = snapshot::temp_path_for(builder.snapshot_path());
    fs::write(&partial, b"[{\"run_name\": \"half").unwrap();

    let corpus: Vec<RunRecord> = snapshot::load(builder.snapshot_path()).await.unwrap();
    assert_eq!(corpus.len(), 1);

    builder.build_once().unwrap();
    let corpus: Vec<RunRecord> = snapshot::load(builder.snapshot_path()).await.unwrap();
    assert_eq!(corpus.len(), 1);
}

#[test]
fn test_empty_log_directory_publishes_empty_corpus() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("logging")).unwrap();

    let builder = builder(dir.path());
    let report = builder.build_once().unwrap();

    assert_eq!(report.records, 0);
    assert_eq!(fs::read_to_string(builder.snapshot_path()).unwrap(), "[]");
}
