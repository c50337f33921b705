use regex::Regex;

use crate::config::SubstituteRule;

/// A rule whose pattern has already been compiled. Rules are compiled when
/// settings are validated, so the lookup path never sees a bad pattern.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pattern: Regex,
    replacement: String,
}

impl CompiledRule {
    pub fn new(rule: &SubstituteRule) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&rule.rule)?,
            // `\n` in the stored replacement stands for a literal newline.
            replacement: rule.substitute.replace("\\n", "\n"),
        })
    }
}

/// Compiles `rules` in order, reporting the index of the first bad pattern.
pub fn compile_rules(rules: &[SubstituteRule]) -> Result<Vec<CompiledRule>, (usize, regex::Error)> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| CompiledRule::new(rule).map_err(|err| (index, err)))
        .collect()
}

/// Applies every rule as a global replace, each over the previous rule's
/// output rather than the original text.
pub fn apply(text: &str, rules: &[CompiledRule]) -> String {
    rules.iter().fold(text.to_string(), |acc, rule| {
        rule.pattern
            .replace_all(&acc, rule.replacement.as_str())
            .into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> Vec<CompiledRule> {
        let rules: Vec<SubstituteRule> = pairs
            .iter()
            .map(|(rule, substitute)| SubstituteRule {
                rule: rule.to_string(),
                substitute: substitute.to_string(),
            })
            .collect();
        compile_rules(&rules).expect("test rules compile")
    }

    #[test]
    fn rules_chain_on_cumulative_output() {
        // The second rule sees the first rule's output, so "a" ends up "c".
        let rules = rules(&[("a", "b"), ("b", "c")]);
        assert_eq!(apply("a", &rules), "c");
    }

    #[test]
    fn replacement_is_global() {
        let rules = rules(&[("o", "0")]);
        assert_eq!(apply("foo boo", &rules), "f00 b00");
    }

    #[test]
    fn escaped_newline_becomes_literal() {
        let rules = rules(&[("<br>", "\\n")]);
        assert_eq!(apply("one<br>two", &rules), "one\ntwo");
    }

    #[test]
    fn capture_group_references_expand() {
        let rules = rules(&[(r"\[(\w+)\]", "($1)")]);
        assert_eq!(apply("[note]", &rules), "(note)");
    }

    #[test]
    fn bad_pattern_reports_index() {
        let bad = vec![
            SubstituteRule {
                rule: "fine".to_string(),
                substitute: "ok".to_string(),
            },
            SubstituteRule {
                rule: "(".to_string(),
                substitute: "x".to_string(),
            },
        ];
        match compile_rules(&bad) {
            Err((index, _)) => assert_eq!(index, 1),
            Ok(_) => panic!("pattern should not compile"),
        }
    }

    #[test]
    fn empty_rule_list_is_identity() {
        assert_eq!(apply("unchanged", &[]), "unchanged");
    }
}
