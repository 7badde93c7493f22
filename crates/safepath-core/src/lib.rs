pub mod config;
pub mod delivery;
pub mod error;
pub mod finding;
pub mod nmap_xml;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod severity;
pub mod targets;

pub use config::{ConfigOverrides, RunConfig};
pub use delivery::{DeliveryClient, FindingSink, RetryPolicy};
pub use error::{Error, Result};
pub use finding::{Finding, FindingBuilder, FindingCandidate, Severity};
pub use nmap_xml::NmapXmlParser;
pub use pipeline::Pipeline;
pub use report::{RunSummary, TargetSummary};
pub use scanner::{NmapInvoker, ScanOutput, ScanRunner};
pub use severity::{FixedSeverity, ServiceSeverityTable, SeverityPolicy};
pub use targets::TargetSet;
