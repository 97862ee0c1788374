#[cfg(test)]
pub mod tests {
    use std::process::{Command, Output};

    fn demo(args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_heapguard"))
            .arg("demo")
            .args(args)
            .env_remove("HEAPGUARD_FORMAT")
            .env_remove("HEAPGUARD_HEAVY_BASIS")
            .env_remove("HEAPGUARD_HEAVY_TOP")
            .env_remove("HEAPGUARD_HEAVY_SHARE")
            .env_remove("HEAPGUARD_QUARANTINE")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute command")
    }

    fn successful_stdout(args: &[&str]) -> String {
        let output = demo(args);
        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    #[test]
    fn test_fatal_scenarios() {
        let cases = [
            ("double-free", ", double free"),
            ("wild-write", ", wild write"),
            ("not-in-heap", ", not in heap"),
            ("not-allocated", ", not allocated"),
        ];

        for (scenario, reason) in cases {
            let output = demo(&[scenario]);
            assert!(
                !output.status.success(),
                "{scenario} should have aborted: {output:?}",
            );

            let stderr = String::from_utf8_lossy(&output.stderr);
            let expected = ["MEMORY BUG: ", "demo.rs:", "invalid free of pointer 0x", reason];
            for expected in expected {
                assert!(
                    stderr.contains(expected),
                    "Output did not match expected.\nExpected:\n{expected}\n\nGot:\n{stderr}",
                );
            }
        }
    }

    #[test]
    fn test_not_allocated_points_at_containing_block() {
        let output = demo(&["not-allocated"]);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("is 16 bytes inside a 100 byte region allocated here"),
            "Missing containing block hint:\n{stderr}",
        );
    }

    #[test]
    fn test_double_free_without_quarantine() {
        let output = demo(&["double-free", "--quarantine", "0"]);
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("MEMORY BUG: ") && !stderr.contains(", double free"),
            "Released block should no longer be recognised:\n{stderr}",
        );
    }

    #[test]
    fn test_leaks_output() {
        let stdout = successful_stdout(&["leaks"]);
        let leak_lines: Vec<_> = stdout
            .lines()
            .filter(|line| line.starts_with("LEAK CHECK: "))
            .collect();
        assert_eq!(leak_lines.len(), 7, "Got:\n{stdout}");
        assert!(leak_lines[0].ends_with("with size 100"), "Got:\n{stdout}");
        assert!(stdout.contains("alloc count: active          7   total         12"));
    }

    #[test]
    fn test_heavy_hitters_output() {
        let stdout = successful_stdout(&["heavy-hitters"]);
        let lines: Vec<_> = stdout.lines().collect();
        assert_eq!(lines.len(), 1, "Got:\n{stdout}");
        assert!(lines[0].starts_with("HEAVY HITTER: "));
        assert!(lines[0].ends_with(": 102400 bytes (~73.7%)"), "Got:\n{stdout}");

        let stdout = successful_stdout(&["heavy-hitters", "--live"]);
        assert!(stdout.trim_end().ends_with(": 20480 bytes (~100.0%)"), "Got:\n{stdout}");

        let stdout = successful_stdout(&["heavy-hitters", "--top", "0"]);
        assert_eq!(stdout.lines().count(), 3, "Got:\n{stdout}");

        let stdout = successful_stdout(&["heavy-hitters", "--share", "10"]);
        assert_eq!(stdout.lines().count(), 3, "Got:\n{stdout}");
    }

    #[test]
    fn test_statistics_json() {
        let stdout = successful_stdout(&["statistics", "--format", "json"]);
        let value: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
        let stats = &value["statistics"];
        assert_eq!(stats["total_count"], 7);
        assert_eq!(stats["total_bytes"], 4400);
        assert_eq!(stats["active_count"], 3);
        assert_eq!(stats["active_bytes"], 272);
        assert_eq!(stats["fail_count"], 0);
        assert!(stats["heap_min"].as_u64().unwrap() < stats["heap_max"].as_u64().unwrap());
    }

    #[test]
    fn test_failure_counters() {
        let stdout = successful_stdout(&["zero-size"]);
        assert!(stdout.contains("zero-size pointers: 0x"));
        assert!(stdout.contains("alloc count: active          0   total          2   fail          0"));

        let stdout = successful_stdout(&["calloc-overflow"]);
        assert!(stdout.contains("alloc count: active          0   total          1   fail          1"));

        let stdout = successful_stdout(&["exhausted"]);
        assert!(stdout.contains("alloc count: active          0   total          1   fail          3"));
        assert!(stdout.contains("alloc size:  active          0   total         64   fail      10101"));
    }

    #[test]
    fn test_table_format() {
        let stdout = successful_stdout(&["leaks", "--format", "table"]);
        let expected = ["[heapguard]", "Allocation statistics", "Leak check: 7 live allocations", "Call site", "Size"];
        for expected in expected {
            assert!(
                stdout.contains(expected),
                "Output did not match expected.\nExpected:\n{expected}\n\nGot:\n{stdout}",
            );
        }
    }

    #[test]
    fn test_format_from_env() {
        let output = Command::new(env!("CARGO_BIN_EXE_heapguard"))
            .args(["demo", "statistics"])
            .env("HEAPGUARD_FORMAT", "json-pretty")
            .output()
            .expect("Failed to execute command");
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.starts_with("{\n"), "Got:\n{stdout}");
    }

    #[test]
    fn test_invalid_share_is_rejected() {
        let output = demo(&["heavy-hitters", "--share", "150"]);
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("--share must be between 0 and 100"), "Got:\n{stderr}");
    }

    #[test]
    fn test_basic_example_output() {
        let output = Command::new("cargo")
            .args(["run", "--example", "basic"])
            .output()
            .expect("Failed to execute command");

        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let expected = [
            "Heap summary from",
            "basic::main",
            "Leak check: 4 live allocations",
            "basic.rs",
            "% Total",
        ];

        let stderr = String::from_utf8_lossy(&output.stderr);
        for expected in expected {
            assert!(
                stderr.contains(expected),
                "Output did not match expected.\nExpected:\n{expected}\n\nGot:\n{stderr}",
            );
        }
    }
}
