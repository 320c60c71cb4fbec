//! Fuzzy replacement of recognized words with user-supplied spellings.
//!
//! Each run of words is compared against every custom word (or phrase) with
//! the same number of words. Comparison ignores case and punctuation; the
//! score is the edit distance divided by the longer length. The closest
//! custom word at or below the threshold replaces the run, keeping the
//! surrounding punctuation.

/// Custom spellings plus the maximum normalized edit distance to accept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordCorrection {
    words: Vec<CustomWord>,
    threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct CustomWord {
    text: String,
    key: Vec<char>,
    word_count: usize,
}

impl WordCorrection {
    pub fn new(words: Vec<String>, threshold: f64) -> Self {
        let words = words
            .into_iter()
            .filter_map(|w| {
                let text = w.split_whitespace().collect::<Vec<_>>().join(" ");
                let key = normalize(&text);
                (!key.is_empty()).then(|| CustomWord {
                    word_count: text.split(' ').count(),
                    text,
                    key,
                })
            })
            .collect();
        Self {
            words,
            threshold: if threshold.is_finite() { threshold.max(0.0) } else { 0.0 },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Replace words in `text` that closely match a custom word.
    pub fn apply(&self, text: &str) -> String {
        if self.words.is_empty() {
            return text.to_string();
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let longest = self.words.iter().map(|w| w.word_count).max().unwrap_or(1);

        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        let mut changed = false;
        let mut i = 0;
        while i < tokens.len() {
            let mut replaced = false;
            for n in (1..=longest.min(tokens.len() - i)).rev() {
                let window = &tokens[i..i + n];
                if let Some(replacement) = self.replace_window(window) {
                    changed |= replacement != window.join(" ");
                    out.push(replacement);
                    i += n;
                    replaced = true;
                    break;
                }
            }
            if !replaced {
                out.push(tokens[i].to_string());
                i += 1;
            }
        }

        if changed { out.join(" ") } else { text.to_string() }
    }

    fn replace_window(&self, window: &[&str]) -> Option<String> {
        let joined = window.join(" ");
        let start = joined.find(|c: char| c.is_alphanumeric())?;
        let end = joined
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_alphanumeric())
            .map(|(i, c)| i + c.len_utf8())?;
        let (prefix, core, suffix) = (&joined[..start], &joined[start..end], &joined[end..]);
        let key = normalize(core);

        let mut best: Option<(f64, &CustomWord)> = None;
        for word in self.words.iter().filter(|w| w.word_count == window.len()) {
            let longer = key.len().max(word.key.len());
            let max_distance = (self.threshold * longer as f64).floor() as usize;
            let distance = bounded_levenshtein(&key, &word.key, max_distance);
            if distance > max_distance {
                continue;
            }
            let score = distance as f64 / longer as f64;
            if best.is_none_or(|(s, _)| score < s) {
                best = Some((score, word));
            }
        }

        let (_, word) = best?;
        Some(format!("{prefix}{}{suffix}", match_case(core, &word.text)))
    }
}

/// Lowercase alphanumerics only.
fn normalize(text: &str) -> Vec<char> {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Custom words spelled with capitals are used as written. All-lowercase ones
/// follow the capitalization of the word they replace.
fn match_case(original: &str, custom: &str) -> String {
    if custom.chars().any(char::is_uppercase) {
        return custom.to_string();
    }
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return custom.to_uppercase();
    }
    if letters.first().is_some_and(|c| c.is_uppercase()) {
        let mut chars = custom.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    custom.to_string()
}

/// Edit distance, or `max_distance + 1` as soon as it is known to exceed it.
fn bounded_levenshtein(a: &[char], b: &[char], max_distance: usize) -> usize {
    if a == b {
        return 0;
    }
    if a.is_empty() || b.is_empty() {
        return a.len().max(b.len());
    }
    if a.len().abs_diff(b.len()) > max_distance {
        return max_distance + 1;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, a_ch) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, b_ch) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(a_ch != b_ch);
            let distance = substitution.min(curr[j] + 1).min(prev[j + 1] + 1);
            curr[j + 1] = distance;
            row_min = row_min.min(distance);
        }
        if row_min > max_distance {
            return max_distance + 1;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
