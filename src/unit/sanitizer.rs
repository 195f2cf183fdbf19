use lazy_static::lazy_static;
use regex::Regex;

use super::rules::SanitizerRules;

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();

    // "THE COLLEGE OF" / "UCF COLLEGE OF" anywhere in the name
    static ref COLLEGE_OF_RE: Regex = Regex::new(r"(?i)(UCF|the) college of").unwrap();

    // Names ending with "SCHOOL OF|FOR", "OFFICE OF|FOR" or "CENTER FOR":
    // split at the last comma and flip the two portions.
    //   $1: the (desired) end of the unit name
    //   $2: the splitting comma
    //   $3: an optional prefix, e.g. "[nicholson] school of..."
    //   $4: the captured "office/school/center" chunk
    //   $5: " of" or " for"
    //   $6: optional " the"
    //   $7: optional parenthesized tail (usually an abbreviation)
    static ref SUFFIX_FUNCTION_RE: Regex = Regex::new(
        r"(?i)^([\w., /-]+)(, )([\w. -]+)?(office|school|center)( of| for)( the)?( \([\w., /-]+\))?$",
    )
    .unwrap();

    // Same flip for names ending with "COLLEGE OF", without keeping the
    // parenthesized tail.
    static ref SUFFIX_COLLEGE_RE: Regex = Regex::new(
        r"(?i)^([\w., /-]+)(, )([\w. -]+)?(college of)( \([\w., /-]+\))?$",
    )
    .unwrap();

    // Names ending with ", school" become "School of ..."
    static ref SUFFIX_SCHOOL_RE: Regex =
        Regex::new(r"(?i)^([\w., /-]+)(, )(school)$").unwrap();

    static ref TRAILING_UCF_RE: Regex = Regex::new(r"(?i), UCF$").unwrap();
    static ref TRAILING_DIVISION_RE: Regex = Regex::new(r"(?i), division of$").unwrap();
    static ref LEADING_DIVISION_RE: Regex = Regex::new(r"(?i)^division of ").unwrap();
    static ref DEPARTMENT_RE: Regex = Regex::new(r"(?i)(, )?department( of)?").unwrap();

    static ref DEANS_LEADING_RE: Regex =
        Regex::new(r"(?i)^(dean)('s)? (office|suite)([\w., /-]+)?$").unwrap();
    static ref DEANS_TRAILING_RE: Regex =
        Regex::new(r"(?i)^([\w., /-]+)?(dean)('s)? (office|suite)$").unwrap();
}

/// Normalizes raw organization and department names into a canonical display
/// form so that cross-source string matching becomes possible.
///
/// Sanitization is pure and deterministic for a given set of rule tables,
/// and idempotent: feeding a sanitized name back in leaves it unchanged.
pub struct NameSanitizer {
    rules: SanitizerRules,
}

impl Default for NameSanitizer {
    fn default() -> Self {
        NameSanitizer::new(SanitizerRules::default())
    }
}

impl NameSanitizer {
    pub fn new(rules: SanitizerRules) -> Self {
        NameSanitizer { rules }
    }

    /// Sanitize a raw unit name. An empty result means the input carried no
    /// usable name and the record should be skipped.
    pub fn sanitize(&self, raw_name: &str) -> String {
        // Trim, and collapse internal whitespace runs to single spaces
        let mut name = WHITESPACE_RE
            .replace_all(raw_name.trim(), " ")
            .into_owned();

        // Perform initial full-name replacements
        for rule in &self.rules.full_name_replacements {
            if rule.matches.iter().any(|m| *m == name) {
                name = rule.replacement.clone();
            }
        }

        // If the unit name is in all-caps, convert it to capital case. Not
        // perfect, but works well enough for the majority of use cases.
        if is_fully_upper(&name) {
            name = self.title_case(&name);
        }

        // Perform basic substring replacements
        for rule in &self.rules.partial_replacements {
            for m in &rule.matches {
                name = name.replace(m.as_str(), &rule.replacement);
            }
        }

        // Collapse "THE COLLEGE OF" / "UCF COLLEGE OF" to "College of"
        name = COLLEGE_OF_RE.replace_all(&name, "College of").into_owned();

        // Flip suffix-style names around their last comma
        name = SUFFIX_FUNCTION_RE
            .replace(&name, "${3}${4}${5}${6} ${1}${7}")
            .into_owned();
        name = SUFFIX_COLLEGE_RE.replace(&name, "${3}${4} ${1}").into_owned();
        name = SUFFIX_SCHOOL_RE.replace(&name, "School of ${1}").into_owned();

        // Fix capitalization on names containing " The "
        name = name.replace(" The ", " the ");

        // Strip trailing ", UCF"
        name = TRAILING_UCF_RE.replace(&name, "").into_owned();

        // Strip leading/trailing "division of" phrasing
        name = TRAILING_DIVISION_RE.replace(&name, "").into_owned();
        name = LEADING_DIVISION_RE.replace(&name, "").into_owned();

        // Department-ness is conveyed by hierarchy, not by the name
        name = DEPARTMENT_RE.replace_all(&name, "").into_owned();

        // Normalize any form of "Dean's Office"/"Dean's Suite"
        name = DEANS_LEADING_RE.replace(&name, "Dean's Office").into_owned();
        name = DEANS_TRAILING_RE.replace(&name, "Dean's Office").into_owned();

        // Force case-exception words not already addressed above
        name = name
            .split(' ')
            .map(|word| {
                let lowered = word.to_lowercase();
                if self.rules.lowercase_words.contains(&lowered) {
                    lowered
                } else {
                    word.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        name = name
            .split(' ')
            .map(|word| {
                let uppered = word.to_uppercase();
                if self.rules.uppercase_words.contains(&uppered) {
                    uppered
                } else {
                    word.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        // Final trim and whitespace collapse
        WHITESPACE_RE.replace_all(name.trim(), " ").into_owned()
    }

    fn title_case(&self, name: &str) -> String {
        let parts: Vec<String> = name
            .split('(')
            .map(|part| self.title_case_part(part))
            .collect();
        let name = parts.join("(");

        // Ensure that parts of a word divided by a dash or slash have the
        // 2nd portion's 1st character capitalized
        let name = recapitalize_joins(&name, '-');
        recapitalize_joins(&name, '/')
    }

    fn title_case_part(&self, part: &str) -> String {
        let words: Vec<&str> = part.split(' ').collect();

        // A single-word part ending in ')' is an abbreviation that lost its
        // opening parenthesis to the split; force it upper-case.
        if words.len() == 1 && part.ends_with(')') {
            return part.to_uppercase();
        }

        let mut cased: Vec<String> = Vec::with_capacity(words.len());
        for (j, word) in words.iter().enumerate() {
            if word.is_empty() {
                cased.push(String::new());
                continue;
            }

            // A trailing ')' or ',' is set aside while the word is cased
            let (stem, end_char) = if word.ends_with(')') || word.ends_with(',') {
                word.split_at(word.len() - 1)
            } else {
                (*word, "")
            };

            let replaced = if j == 0 && end_char == ")" {
                stem.to_uppercase()
            } else if self.rules.lowercase_words.contains(&stem.to_lowercase()) {
                stem.to_lowercase()
            } else if self.rules.uppercase_words.contains(&stem.to_uppercase()) {
                stem.to_uppercase()
            } else {
                capitalize(stem)
            };

            cased.push(format!("{}{}", replaced, end_char));
        }

        cased.join(" ")
    }
}

/// True when every cased character is upper-case and at least one exists.
fn is_fully_upper(name: &str) -> bool {
    let mut has_cased = false;
    for c in name.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str().to_lowercase()),
        None => String::new(),
    }
}

fn recapitalize_joins(name: &str, separator: char) -> String {
    name.split(separator)
        .map(|piece| {
            let mut chars = piece.chars();
            match chars.next() {
                Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}
