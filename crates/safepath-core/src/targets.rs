use serde::Serialize;

/// Delimiter between targets in a target list string.
pub const TARGET_DELIMITER: char = ',';

/// Ordered, normalized list of scan targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TargetSet {
    targets: Vec<String>,
}

impl TargetSet {
    /// Parse a comma-delimited target list.
    ///
    /// Elements are trimmed and empty ones dropped; input order is kept.
    pub fn parse(raw: &str) -> Self {
        let targets = raw
            .split(TARGET_DELIMITER)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        Self { targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.targets
    }
}

impl std::fmt::Display for TargetSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.targets.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_drops_empty() {
        let set = TargetSet::parse(" host1 , host2 ,, ");
        assert_eq!(set.as_slice(), &["host1".to_string(), "host2".to_string()]);
    }

    #[test]
    fn test_preserves_input_order() {
        let set = TargetSet::parse("10.0.0.9,scanme.nmap.org,10.0.0.1");
        let order: Vec<&str> = set.iter().collect();
        assert_eq!(order, vec!["10.0.0.9", "scanme.nmap.org", "10.0.0.1"]);
    }

    #[test]
    fn test_blank_input_is_empty() {
        assert!(TargetSet::parse("").is_empty());
        assert!(TargetSet::parse(" , ,\t,").is_empty());
    }

    #[test]
    fn test_display_round_trips_normalized_form() {
        let set = TargetSet::parse(" a ,b");
        assert_eq!(set.to_string(), "a,b");
        assert_eq!(set.len(), 2);
    }
}
