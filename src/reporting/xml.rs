use std::fmt::Write as _;
use tracing::info;

use super::{FailureReport, ResultReporter, XmlResultJargon};
use crate::error::Result;
use crate::logger::{LogFile, Logs};

/// 生成最小的 NUnit / xUnit 失败文档
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlResultReporter;

impl XmlResultReporter {
    pub fn new() -> Self {
        Self
    }

    fn render(failure: &FailureReport, jargon: XmlResultJargon, output: &str) -> String {
        let name = escape_xml(&failure.app_name);
        let title = escape_xml(&failure.title);
        let message = escape_xml(&failure.message);
        let variation = escape_xml(&failure.variation);
        let output = escape_xml(output);
        let now = chrono::Local::now();

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        // write! 到 String 不会失败
        let _ = match jargon {
            XmlResultJargon::NUnitV2 => write!(
                xml,
                "<test-results name=\"{name}\" total=\"1\" errors=\"0\" failures=\"1\" not-run=\"0\" inconclusive=\"0\" ignored=\"0\" skipped=\"0\" invalid=\"0\" date=\"{date}\" time=\"{time}\">\n\
                 \x20 <test-suite type=\"Assembly\" name=\"{name}\" executed=\"True\" result=\"Failure\" success=\"False\" time=\"0\">\n\
                 \x20   <results>\n\
                 \x20     <test-case name=\"{title}\" description=\"{variation}\" executed=\"True\" result=\"Failure\" success=\"False\" time=\"0\">\n\
                 \x20       <failure>\n\
                 \x20         <message>{message}</message>\n\
                 \x20         <stack-trace>{output}</stack-trace>\n\
                 \x20       </failure>\n\
                 \x20     </test-case>\n\
                 \x20   </results>\n\
                 \x20 </test-suite>\n\
                 </test-results>\n",
                date = now.format("%Y-%m-%d"),
                time = now.format("%H:%M:%S"),
            ),
            XmlResultJargon::NUnitV3 => write!(
                xml,
                "<test-run id=\"2\" testcasecount=\"1\" result=\"Failed\" total=\"1\" passed=\"0\" failed=\"1\" inconclusive=\"0\" skipped=\"0\" asserts=\"0\" start-time=\"{start}\">\n\
                 \x20 <test-suite type=\"Assembly\" id=\"1\" name=\"{name}\" fullname=\"{name}\" testcasecount=\"1\" result=\"Failed\" total=\"1\" passed=\"0\" failed=\"1\">\n\
                 \x20   <test-case id=\"1-1\" name=\"{title}\" fullname=\"{title}\" result=\"Failed\">\n\
                 \x20     <properties>\n\
                 \x20       <property name=\"variation\" value=\"{variation}\" />\n\
                 \x20     </properties>\n\
                 \x20     <failure>\n\
                 \x20       <message>{message}</message>\n\
                 \x20     </failure>\n\
                 \x20     <output>{output}</output>\n\
                 \x20   </test-case>\n\
                 \x20 </test-suite>\n\
                 </test-run>\n",
                start = now.to_rfc3339(),
            ),
            XmlResultJargon::XUnit => write!(
                xml,
                "<assemblies>\n\
                 \x20 <assembly name=\"{name}\" environment=\"{variation}\" test-framework=\"xUnit.net\" run-date=\"{date}\" run-time=\"{time}\" total=\"1\" passed=\"0\" failed=\"1\" skipped=\"0\" errors=\"0\">\n\
                 \x20   <collection name=\"{name}\" total=\"1\" passed=\"0\" failed=\"1\" skipped=\"0\">\n\
                 \x20     <test name=\"{title}\" type=\"{name}\" method=\"{title}\" time=\"0\" result=\"Fail\">\n\
                 \x20       <failure>\n\
                 \x20         <message>{message}</message>\n\
                 \x20         <stack-trace>{output}</stack-trace>\n\
                 \x20       </failure>\n\
                 \x20     </test>\n\
                 \x20   </collection>\n\
                 \x20 </assembly>\n\
                 </assemblies>\n",
                date = now.format("%Y-%m-%d"),
                time = now.format("%H:%M:%S"),
            ),
        };
        xml
    }
}

impl ResultReporter for XmlResultReporter {
    fn generate_failure(
        &self,
        logs: &Logs,
        failure: &FailureReport,
        jargon: XmlResultJargon,
    ) -> Result<LogFile> {
        // 附带的日志读不到时只保留失败信息
        let output = std::fs::read(&failure.log_path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        let prefix = match jargon {
            XmlResultJargon::NUnitV2 | XmlResultJargon::NUnitV3 => "nunit",
            XmlResultJargon::XUnit => "xunit",
        };
        let report = logs.create(
            &format!("{}-{}.xml", prefix, failure.step),
            "XML log",
            true,
        )?;
        report.write_raw(Self::render(failure, jargon, &output).as_bytes())?;

        info!("已生成失败报告: {}", report.path().display());
        Ok(report)
    }
}

fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            // XML 1.0 不允许的控制字符
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            _ => escaped.push(ch),
        }
    }
    escaped
}
