//! Responsible-gaming disclaimers by state.

/// National disclaimer, used for "ALL" and for states without a specific helpline.
pub const NATIONAL_DISCLAIMER: &str =
    "21+. Gambling problem? Call 1-800-GAMBLER. Please bet responsibly.";

const STATE_DISCLAIMERS: &[(&str, &str)] = &[
    ("NY", "21+. Gambling problem? Call 877-8-HOPENY or text HOPENY (467369)."),
    ("AZ", "21+. Gambling problem? Call 1-800-NEXT-STEP."),
    ("PA", "21+. Gambling problem? Call 1-800-GAMBLER."),
    ("NJ", "21+. Gambling problem? Call 1-800-GAMBLER."),
    ("CO", "21+. Gambling problem? Call 1-800-522-4700."),
    ("MI", "21+. Gambling problem? Call 1-800-270-7117."),
    ("VA", "21+. Gambling problem? Call 1-888-532-3500."),
    (
        "OH",
        "21+. If you or a loved one has a gambling problem, call 1-800-589-9966.",
    ),
    ("MA", "21+. Gambling problem? Call 1-800-327-5050."),
    ("KY", "21+. Gambling problem? Call 1-800-522-4700."),
];

/// Get the responsible-gaming disclaimer for a state code.
pub fn disclaimer_for_state(state: &str) -> &'static str {
    let code = state.trim().to_uppercase();
    STATE_DISCLAIMERS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, text)| *text)
        .unwrap_or(NATIONAL_DISCLAIMER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_specific_disclaimer() {
        assert!(disclaimer_for_state("ny").contains("HOPENY"));
        assert!(disclaimer_for_state("OH").contains("1-800-589-9966"));
    }

    #[test]
    fn test_fallback_to_national() {
        assert_eq!(disclaimer_for_state("ALL"), NATIONAL_DISCLAIMER);
        assert_eq!(disclaimer_for_state("TX"), NATIONAL_DISCLAIMER);
        assert_eq!(disclaimer_for_state(""), NATIONAL_DISCLAIMER);
    }
}
