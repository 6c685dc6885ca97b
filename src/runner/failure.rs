//! 从运行日志推断失败原因

use regex::Regex;

use crate::logger::LogFile;

/// 扫描运行日志，返回最可能的失败原因
///
/// 日志无法读取或没有已知特征时返回 None。
pub fn guess_failure_reason(log: &LogFile) -> Option<String> {
    let content = log.read_to_string().ok()?;
    guess_from_text(&content)
}

fn guess_from_text(content: &str) -> Option<String> {
    let exception_regex = Regex::new(r"(?m)Unhandled (?:managed )?[Ee]xception:?\s*(.+)$").ok()?;
    if let Some(caps) = exception_regex.captures(content) {
        return Some(format!("Unhandled exception: {}", caps[1].trim()));
    }

    let launch_regex =
        Regex::new(r"(?i)(error MT1007|failed to launch the application|could not launch)").ok()?;
    if launch_regex.is_match(content) {
        return Some("Failed to launch the application.".to_string());
    }

    let crash_regex = Regex::new(
        r"(?i)(application (?:has )?crashed|exited with signal|SIGABRT|SIGSEGV|EXC_BAD_ACCESS)",
    )
    .ok()?;
    if crash_regex.is_match(content) {
        return Some("The application crashed.".to_string());
    }

    // 取最后一次测试汇总，前面的可能来自重试
    let summary_regex = Regex::new(
        r"Tests run:\s*(\d+)\s+Passed:\s*(\d+)(?:\s+Inconclusive:\s*\d+)?\s+Failed:\s*(\d+)",
    )
    .ok()?;
    if let Some(caps) = summary_regex.captures_iter(content).last() {
        let failed: u32 = caps[3].parse().ok()?;
        if failed > 0 {
            return Some(format!(
                "Tests run: {}, passed: {}, failed: {}.",
                &caps[1], &caps[2], failed
            ));
        }
    }

    let timeout_regex = Regex::new(r"(?i)(timed out|timeout expired)").ok()?;
    if timeout_regex.is_match(content) {
        return Some("The test run timed out.".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logs;

    #[test]
    fn test_unhandled_exception() {
        let text = "launching...\nUnhandled managed exception: Boom (System.Exception)\nbye";
        assert_eq!(
            guess_from_text(text).as_deref(),
            Some("Unhandled exception: Boom (System.Exception)")
        );
    }

    #[test]
    fn test_launch_failure() {
        let text = "error MT1007: Failed to launch the application 'x' on the device";
        assert_eq!(
            guess_from_text(text).as_deref(),
            Some("Failed to launch the application.")
        );
    }

    #[test]
    fn test_last_summary_wins() {
        let text = "Tests run: 10 Passed: 10 Inconclusive: 0 Failed: 0 Ignored: 0\n\
                    Tests run: 12 Passed: 9 Inconclusive: 0 Failed: 3 Ignored: 0";
        assert_eq!(
            guess_from_text(text).as_deref(),
            Some("Tests run: 12, passed: 9, failed: 3.")
        );
    }

    #[test]
    fn test_clean_summary_has_no_reason() {
        let text = "Tests run: 10 Passed: 10 Inconclusive: 0 Failed: 0 Ignored: 0";
        assert_eq!(guess_from_text(text), None);
    }

    #[test]
    fn test_reads_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = Logs::new(dir.path());
        let log = logs.create("run.log", "Run log", false).unwrap();
        log.write_line("Application has crashed");

        assert_eq!(
            guess_failure_reason(&log).as_deref(),
            Some("The application crashed.")
        );
    }
}
