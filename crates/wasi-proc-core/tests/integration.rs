//! Integration tests for wasi-proc-core.
//!
//! These tests verify the complete processing pipeline with WAT fixtures
//! speaking the WASI preview 1 ABI directly:
//! - argv delivery and stdout round-trip
//! - exit-code and trap mapping
//! - stderr-as-failure
//! - both capture strategies, sequentially and concurrently
//! - scratch lifecycle and idempotent teardown

use std::path::PathBuf;

use wasi_proc_common::{
    CaptureConfig, CaptureMode, EngineConfig, ExecutionConfig, ProcessorConfig, ProcessorError,
};
use wasi_proc_core::WasiProcessor;

/// Writes `argv[1]` verbatim to stdout.
const ECHO_WAT: &str = r#"
    (module
        (import "wasi_snapshot_preview1" "args_sizes_get"
            (func $args_sizes_get (param i32 i32) (result i32)))
        (import "wasi_snapshot_preview1" "args_get"
            (func $args_get (param i32 i32) (result i32)))
        (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
        (memory (export "memory") 1)

        (func $strlen (param $p i32) (result i32)
            (local $n i32)
            (block $done
                (loop $scan
                    (br_if $done
                        (i32.eqz (i32.load8_u (i32.add (local.get $p) (local.get $n)))))
                    (local.set $n (i32.add (local.get $n) (i32.const 1)))
                    (br $scan)
                )
            )
            (local.get $n)
        )

        (func (export "_start")
            (local $arg i32)
            (drop (call $args_sizes_get (i32.const 0) (i32.const 4)))
            (drop (call $args_get (i32.const 32) (i32.const 256)))
            (if (i32.lt_u (i32.load (i32.const 0)) (i32.const 2))
                (then (return)))
            (local.set $arg (i32.load (i32.const 36)))
            (i32.store (i32.const 16) (local.get $arg))
            (i32.store (i32.const 20) (call $strlen (local.get $arg)))
            (drop (call $fd_write (i32.const 1) (i32.const 16) (i32.const 1) (i32.const 8)))
        )
    )
"#;

/// Uppercases every argument and prints it followed by " WASM RULES\n".
const UPPER_WAT: &str = r#"
    (module
        (import "wasi_snapshot_preview1" "args_sizes_get"
            (func $args_sizes_get (param i32 i32) (result i32)))
        (import "wasi_snapshot_preview1" "args_get"
            (func $args_get (param i32 i32) (result i32)))
        (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
        (memory (export "memory") 1)
        (data (i32.const 128) " WASM RULES\n")

        (func $strlen (param $p i32) (result i32)
            (local $n i32)
            (block $done
                (loop $scan
                    (br_if $done
                        (i32.eqz (i32.load8_u (i32.add (local.get $p) (local.get $n)))))
                    (local.set $n (i32.add (local.get $n) (i32.const 1)))
                    (br $scan)
                )
            )
            (local.get $n)
        )

        (func $upper (param $p i32) (param $n i32)
            (local $i i32)
            (local $c i32)
            (block $done
                (loop $next
                    (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
                    (local.set $c (i32.load8_u (i32.add (local.get $p) (local.get $i))))
                    (if (i32.and
                            (i32.ge_u (local.get $c) (i32.const 97))
                            (i32.le_u (local.get $c) (i32.const 122)))
                        (then (i32.store8
                            (i32.add (local.get $p) (local.get $i))
                            (i32.sub (local.get $c) (i32.const 32)))))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br $next)
                )
            )
        )

        (func $print (param $p i32) (param $n i32)
            (i32.store (i32.const 16) (local.get $p))
            (i32.store (i32.const 20) (local.get $n))
            (drop (call $fd_write (i32.const 1) (i32.const 16) (i32.const 1) (i32.const 8)))
        )

        (func (export "_start")
            (local $i i32)
            (local $argc i32)
            (local $p i32)
            (local $n i32)
            (drop (call $args_sizes_get (i32.const 0) (i32.const 4)))
            (drop (call $args_get (i32.const 32) (i32.const 256)))
            (local.set $argc (i32.load (i32.const 0)))
            (block $done
                (loop $next
                    (br_if $done (i32.ge_u (local.get $i) (local.get $argc)))
                    (local.set $p (i32.load
                        (i32.add (i32.const 32) (i32.mul (local.get $i) (i32.const 4)))))
                    (local.set $n (call $strlen (local.get $p)))
                    (call $upper (local.get $p) (local.get $n))
                    (call $print (local.get $p) (local.get $n))
                    (call $print (i32.const 128) (i32.const 12))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br $next)
                )
            )
        )
    )
"#;

/// Writes "boom" to stderr and exits cleanly.
const STDERR_WAT: &str = r#"
    (module
        (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
        (memory (export "memory") 1)
        (data (i32.const 128) "boom")
        (func (export "_start")
            (i32.store (i32.const 16) (i32.const 128))
            (i32.store (i32.const 20) (i32.const 4))
            (drop (call $fd_write (i32.const 2) (i32.const 16) (i32.const 1) (i32.const 8)))
        )
    )
"#;

/// Hits an unreachable instruction immediately.
const TRAP_WAT: &str = r#"
    (module
        (memory (export "memory") 1)
        (func (export "_start")
            unreachable
        )
    )
"#;

/// Declares an import no sandbox provides.
const MISSING_IMPORT_WAT: &str = r#"
    (module
        (import "host_missing" "f" (func $f))
        (memory (export "memory") 1)
        (func (export "_start")
            (call $f)
        )
    )
"#;

/// Loops forever.
const SPIN_WAT: &str = r#"
    (module
        (memory (export "memory") 1)
        (func (export "_start")
            (loop $forever
                (br $forever)
            )
        )
    )
"#;

fn exit_wat(code: i32) -> String {
    format!(
        r#"
        (module
            (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (call $proc_exit (i32.const {code}))
            )
        )
        "#
    )
}

fn buffered_processor(wat: &str) -> WasiProcessor {
    WasiProcessor::from_wat(wat, ProcessorConfig::default()).unwrap()
}

fn file_processor(wat: &str, io_dir: Option<PathBuf>) -> WasiProcessor {
    let config = ProcessorConfig {
        capture: CaptureConfig {
            mode: CaptureMode::File,
            io_dir,
            ..Default::default()
        },
        ..Default::default()
    };
    WasiProcessor::from_wat(wat, config).unwrap()
}

// ============================================================================
// Test: Round-trip of captured bytes
// ============================================================================

#[tokio::test]
async fn test_echo_round_trip() {
    let proc = buffered_processor(ECHO_WAT);

    let out = proc.process(b"hello world").await.unwrap();
    assert_eq!(out, b"hello world");
}

#[tokio::test]
async fn test_uppercase_fixture() {
    let proc = buffered_processor(UPPER_WAT);

    let out = proc.process(b"hello world").await.unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "WASI_PROC WASM RULES\nHELLO WORLD WASM RULES\n"
    );
}

#[tokio::test]
async fn test_sequential_runs_do_not_leak() {
    let proc = buffered_processor(ECHO_WAT);

    let first = proc.process(b"first payload").await.unwrap();
    assert_eq!(first, b"first payload");

    let second = proc.process(b"x").await.unwrap();
    assert_eq!(second, b"x");
}

// ============================================================================
// Test: Termination outcomes
// ============================================================================

#[tokio::test]
async fn test_exit_zero_never_fails() {
    let proc = buffered_processor(&exit_wat(0));

    let out = proc.process(b"payload").await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_surfaces_exact_code() {
    let proc = buffered_processor(&exit_wat(42));

    let err = proc.process(b"payload").await.unwrap_err();
    assert!(matches!(err, ProcessorError::NonZeroExit { code: 42 }));
    assert!(err.is_guest_failure());
}

#[tokio::test]
async fn test_trap_surfaces() {
    let proc = buffered_processor(TRAP_WAT);

    let err = proc.process(b"payload").await.unwrap_err();
    assert!(matches!(err, ProcessorError::Trapped { .. }));
}

#[tokio::test]
async fn test_stderr_fails_even_on_clean_exit() {
    let proc = buffered_processor(STDERR_WAT);

    let err = proc.process(b"payload").await.unwrap_err();
    match err {
        ProcessorError::GuestError { message } => assert_eq!(message, "boom"),
        other => panic!("Expected GuestError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_import_is_per_call() {
    let proc = buffered_processor(MISSING_IMPORT_WAT);

    let err = proc.process(b"payload").await.unwrap_err();
    assert!(matches!(err, ProcessorError::Instantiation { .. }));

    // The compiled module stays usable; the same call fails the same way
    let err = proc.process(b"payload").await.unwrap_err();
    assert!(matches!(err, ProcessorError::Instantiation { .. }));
}

#[test]
fn test_malformed_module_bytes() {
    let result = WasiProcessor::new(b"garbage bytes", ProcessorConfig::default());
    assert!(matches!(result, Err(ProcessorError::Compilation { .. })));
}

// ============================================================================
// Test: File-redirected capture
// ============================================================================

#[tokio::test]
async fn test_file_strategy_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let proc = file_processor(ECHO_WAT, Some(tmp.path().to_path_buf()));

    let out = proc.process(b"hello world").await.unwrap();
    assert_eq!(out, b"hello world");
}

#[tokio::test]
async fn test_file_strategy_no_leak_between_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let proc = file_processor(ECHO_WAT, Some(tmp.path().to_path_buf()));

    let first = proc.process(b"a much longer first payload").await.unwrap();
    assert_eq!(first, b"a much longer first payload");

    let second = proc.process(b"x").await.unwrap();
    assert_eq!(second, b"x");
}

#[tokio::test]
async fn test_file_strategy_caller_dir_survives_close() {
    let tmp = tempfile::tempdir().unwrap();
    let proc = file_processor(ECHO_WAT, Some(tmp.path().to_path_buf()));

    proc.process(b"payload").await.unwrap();
    proc.close().unwrap();

    assert!(tmp.path().is_dir());
}

#[tokio::test]
async fn test_file_strategy_owned_dir_close_idempotent() {
    let proc = file_processor(ECHO_WAT, None);

    proc.process(b"payload").await.unwrap();
    proc.close().unwrap();
    proc.close().unwrap();
}

// ============================================================================
// Test: Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_buffered_isolation() {
    let proc = buffered_processor(ECHO_WAT);

    let mut handles = Vec::new();
    for i in 0..16 {
        let proc = proc.clone();
        handles.push(tokio::spawn(async move {
            let payload = format!("payload-{i}");
            let out = proc.process(payload.as_bytes()).await.unwrap();
            (payload, out)
        }));
    }

    for handle in handles {
        let (payload, out) = handle.await.unwrap();
        assert_eq!(out, payload.as_bytes());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_file_isolation() {
    let tmp = tempfile::tempdir().unwrap();
    let proc = file_processor(ECHO_WAT, Some(tmp.path().to_path_buf()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let proc = proc.clone();
        handles.push(tokio::spawn(async move {
            let payload = format!("payload-{i}");
            let out = proc.process(payload.as_bytes()).await.unwrap();
            (payload, out)
        }));
    }

    for handle in handles {
        let (payload, out) = handle.await.unwrap();
        assert_eq!(out, payload.as_bytes());
    }
}

// ============================================================================
// Test: Resource limits
// ============================================================================

#[tokio::test]
async fn test_fuel_exhaustion() {
    let config = ProcessorConfig {
        engine: EngineConfig {
            fuel_metering: true,
            ..Default::default()
        },
        execution: ExecutionConfig {
            max_fuel: 10_000,
            ..Default::default()
        },
        ..Default::default()
    };
    let proc = WasiProcessor::from_wat(SPIN_WAT, config).unwrap();

    let err = proc.process(b"payload").await.unwrap_err();
    assert!(matches!(err, ProcessorError::FuelExhausted));
    assert!(err.is_resource_limit());
}

#[tokio::test]
async fn test_timeout_detaches_from_run() {
    // Fuel bounds the detached run so the test process can shut down;
    // the timeout fires long before the budget is spent.
    let config = ProcessorConfig {
        engine: EngineConfig {
            fuel_metering: true,
            ..Default::default()
        },
        execution: ExecutionConfig {
            max_fuel: 200_000_000,
            timeout_ms: Some(50),
        },
        ..Default::default()
    };
    let proc = WasiProcessor::from_wat(SPIN_WAT, config).unwrap();

    let err = proc.process(b"payload").await.unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::ExecutionTimeout { duration_ms: 50 }
    ));
}
