//! Ordered regex rewrite rules for recognition output.

use regex::{Captures, Regex};

use super::engine::{Aggressiveness, CorrectionOptions};

/// Compiles a built-in pattern, logging instead of panicking on failure.
pub(crate) fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            log::warn!("Skipping correction pattern '{}': {}", pattern, e);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rewrite {
    /// Replacement template, `$1` style.
    Template(&'static str),
    /// Keep group 1, uppercase group 2.
    CapitalizeSecondGroup,
}

/// When a rule is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Always,
    AtLeast(Aggressiveness),
    /// Layout changes; skipped when formatting must be preserved.
    Layout,
    /// Case changes; aggressive only, skipped when case must be preserved.
    Case,
}

#[derive(Debug, Clone)]
struct Rule {
    name: &'static str,
    pattern: Regex,
    rewrite: Rewrite,
    gate: Gate,
}

impl Rule {
    fn enabled(&self, options: &CorrectionOptions) -> bool {
        match self.gate {
            Gate::Always => true,
            Gate::AtLeast(level) => options.aggressiveness >= level,
            Gate::Layout => !options.preserve_format,
            Gate::Case => options.aggressiveness == Aggressiveness::Aggressive && !options.preserve_case,
        }
    }

    fn apply(&self, text: &str) -> (String, u32) {
        let hits = self.pattern.find_iter(text).count() as u32;
        if hits == 0 {
            return (text.to_string(), 0);
        }
        let rewritten = match self.rewrite {
            Rewrite::Template(template) => self.pattern.replace_all(text, template).into_owned(),
            Rewrite::CapitalizeSecondGroup => self
                .pattern
                .replace_all(text, |caps: &Captures| {
                    let lead = caps.get(1).map_or("", |m| m.as_str());
                    let letter = caps.get(2).map_or("", |m| m.as_str());
                    format!("{}{}", lead, letter.to_uppercase())
                })
                .into_owned(),
        };
        (rewritten, hits)
    }
}

const RULES: &[(&str, &str, Rewrite, Gate)] = &[
    ("ligature_fi", "ﬁ", Rewrite::Template("fi"), Gate::Always),
    ("ligature_fl", "ﬂ", Rewrite::Template("fl"), Gate::Always),
    ("ligature_ff", "ﬀ", Rewrite::Template("ff"), Gate::Always),
    ("double_quotes", "[“”„]", Rewrite::Template("\""), Gate::Always),
    ("single_quotes", "[‘’‚]", Rewrite::Template("'"), Gate::Always),
    ("space_before_punctuation", r"[ \t]+([,.;:!?])", Rewrite::Template("$1"), Gate::Always),
    (
        "letter_o_in_number",
        r"(\d)[Oo](\d)",
        Rewrite::Template("${1}0${2}"),
        Gate::AtLeast(Aggressiveness::Balanced),
    ),
    (
        "letter_l_in_number",
        r"(\d)[lI|](\d)",
        Rewrite::Template("${1}1${2}"),
        Gate::AtLeast(Aggressiveness::Balanced),
    ),
    (
        "letter_s_in_number",
        r"(\d)S(\d)",
        Rewrite::Template("${1}5${2}"),
        Gate::AtLeast(Aggressiveness::Aggressive),
    ),
    ("hyphenated_line_break", r"(\w)-\n(\w)", Rewrite::Template("$1$2"), Gate::Layout),
    ("trailing_whitespace", r"[ \t]+\n", Rewrite::Template("\n"), Gate::Layout),
    ("repeated_spaces", r"[ \t]{2,}", Rewrite::Template(" "), Gate::Layout),
    ("excess_blank_lines", r"\n{3,}", Rewrite::Template("\n\n"), Gate::Layout),
    (
        "sentence_start",
        r"(^|[.!?]\s+)([a-z])",
        Rewrite::CapitalizeSecondGroup,
        Gate::Case,
    ),
];

/// The built-in rule list, compiled once per engine.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn standard() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(name, pattern, rewrite, gate)| {
                compile(pattern).map(|pattern| Rule {
                    name: *name,
                    pattern,
                    rewrite: *rewrite,
                    gate: *gate,
                })
            })
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every enabled rule in order. Returns the text and the number of
    /// individual rewrites made.
    pub fn apply(&self, text: &str, options: &CorrectionOptions) -> (String, u32) {
        let mut current = text.to_string();
        let mut total = 0;

        for rule in self.rules.iter().filter(|r| r.enabled(options)) {
            let (next, hits) = rule.apply(&current);
            if hits > 0 {
                log::trace!("Rule {} applied {} time(s)", rule.name, hits);
                total += hits;
                current = next;
            }
        }

        (current, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(aggressiveness: Aggressiveness, preserve_case: bool, preserve_format: bool) -> CorrectionOptions {
        CorrectionOptions {
            preserve_case,
            preserve_format,
            aggressiveness,
        }
    }

    #[test]
    fn test_all_builtin_patterns_compile() {
        assert_eq!(RuleSet::standard().len(), RULES.len());
    }

    #[test]
    fn test_digit_confusions_fixed_when_balanced() {
        let rules = RuleSet::standard();
        let (text, hits) = rules.apply("Total 1O5 and 2l4", &options(Aggressiveness::Balanced, true, true));
        assert_eq!(text, "Total 105 and 214");
        assert_eq!(hits, 2);
    }

    #[test]
    fn test_conservative_leaves_digits_alone() {
        let rules = RuleSet::standard();
        let (text, hits) = rules.apply("Room 1O5", &options(Aggressiveness::Conservative, true, true));
        assert_eq!(text, "Room 1O5");
        assert_eq!(hits, 0);
    }

    #[test]
    fn test_layout_rules_respect_preserve_format() {
        let rules = RuleSet::standard();
        let input = "infor-\nmation  here";

        let (kept, _) = rules.apply(input, &options(Aggressiveness::Balanced, true, true));
        assert_eq!(kept, input);

        let (joined, hits) = rules.apply(input, &options(Aggressiveness::Balanced, true, false));
        assert_eq!(joined, "information here");
        assert_eq!(hits, 2);
    }

    #[test]
    fn test_punctuation_and_quotes() {
        let rules = RuleSet::standard();
        let (text, hits) = rules.apply("He said “hi” , then left .", &options(Aggressiveness::Conservative, true, true));
        assert_eq!(text, "He said \"hi\", then left.");
        assert_eq!(hits, 4);
    }

    #[test]
    fn test_sentence_case_only_when_aggressive_and_allowed() {
        let rules = RuleSet::standard();
        let input = "first line. second line";

        let (kept, _) = rules.apply(input, &options(Aggressiveness::Aggressive, true, false));
        assert_eq!(kept, input);

        let (capitalized, _) = rules.apply(input, &options(Aggressiveness::Aggressive, false, false));
        assert_eq!(capitalized, "First line. Second line");
    }
}
