use std::collections::HashSet;

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '.' && c != '-')
        .map(|t| t.trim_matches(|c| c == '.' || c == '-').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Splits on newlines and on a '.' that ends a sentence, so section numbers
/// such as `6.1` stay in one piece.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => true,
            '.' => chars.peek().map_or(true, |(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            out.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    out.push(&text[start..]);
    out
}

/// Share of the reference's tokens that occur in the sentence.
fn coverage(reference: &[String], sentence: &HashSet<String>) -> f64 {
    if reference.is_empty() {
        return 0.0;
    }
    let hits = reference.iter().filter(|t| sentence.contains(*t)).count();
    hits as f64 / reference.len() as f64
}

/// Fraction of cited policy references that the retrieved context supports.
///
/// A reference counts as grounded when it appears verbatim (ignoring case) in
/// the context, or when at least `threshold` of its tokens occur in a single
/// context sentence. No references means nothing was invented, so 1.0.
pub fn groundedness<S: AsRef<str>>(references: &[String], context: &[S], threshold: f64) -> f64 {
    if references.is_empty() {
        return 1.0;
    }
    let joined = context
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();
    if joined.trim().is_empty() {
        return 0.0;
    }

    let sentences: Vec<HashSet<String>> = split_sentences(&joined)
        .into_iter()
        .map(|s| tokens(s).into_iter().collect::<HashSet<_>>())
        .filter(|s| !s.is_empty())
        .collect();

    let grounded = references
        .iter()
        .filter(|reference| {
            let lowered = reference.trim().to_lowercase();
            if !lowered.is_empty() && joined.contains(&lowered) {
                return true;
            }
            let ref_tokens = tokens(&lowered);
            sentences
                .iter()
                .map(|s| coverage(&ref_tokens, s))
                .fold(0.0, f64::max)
                >= threshold
        })
        .count();

    grounded as f64 / references.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: [&str; 2] = [
        "### 6.1 Tier-1 High-Risk Countries\nTransactions from a Tier-1 country above EUR 10,000 must be blocked.",
        "case_id: C002\ncountry: NG\nlabel: High",
    ];

    #[test]
    fn no_references_is_fully_grounded() {
        assert_eq!(groundedness(&[], &CONTEXT, 0.75), 1.0);
    }

    #[test]
    fn no_context_grounds_nothing() {
        let refs = vec!["Section 6.1".to_string()];
        assert_eq!(groundedness::<&str>(&refs, &[], 0.75), 0.0);
    }

    #[test]
    fn verbatim_and_token_overlap_count() {
        let refs = vec![
            "6.1 Tier-1 High-Risk Countries".to_string(),
            "tier-1 country transactions blocked".to_string(),
            "Section 9.9 Advanced Risk Model".to_string(),
        ];
        let score = groundedness(&refs, &CONTEXT, 0.75);
        assert!((score - 2.0 / 3.0).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn numbered_section_citation_is_grounded() {
        let context = ["### 6.1 Tier-1 high-risk countries\n\nTier-1 countries: NG, GH, KP. Block above EUR 10,000."];
        let refs = vec!["Section 6.1 Tier-1 high-risk countries".to_string()];
        assert_eq!(groundedness(&refs, &context, 0.75), 1.0);
    }

    #[test]
    fn decimal_points_do_not_end_sentences() {
        assert_eq!(
            split_sentences("see 6.1 first. then 7\nend."),
            vec!["see 6.1 first", " then 7", "end", ""]
        );
    }
}
