/// Human readable text for the slurmrestd error numbers the controller
/// surfaces in `status.errors`.
const ERROR_CODES: &[(i64, &str)] = &[
    (2084, "Job has already finished"),
    (2017, "Invalid job ID specified"),
    (2127, "Environment must be set"),
    (9001, "Failure during parsing"),
    (5005, "Zero Bytes were transmitted or received"),
    (9003, "Nothing found with query"),
];

pub fn error_message(code: i64) -> Option<&'static str> {
    ERROR_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, message)| *message)
}

/// Maps error numbers to messages, dropping codes that have no entry.
pub fn error_messages(codes: impl IntoIterator<Item = i64>) -> Vec<String> {
    codes
        .into_iter()
        .filter_map(error_message)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(error_message(2017), Some("Invalid job ID specified"));
        assert_eq!(error_message(1), None);
        assert_eq!(
            error_messages([2127, 42, 9003]),
            vec!["Environment must be set", "Nothing found with query"]
        );
    }
}
