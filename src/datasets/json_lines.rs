use crate::datasets::{DatasetError, Item};

/// Parse one JSON object per line, skipping blank lines
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Item>, DatasetError> {
    let mut items = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref().trim();

        if line.is_empty() {
            continue;
        }

        let item: Item = serde_json::from_str(line).map_err(|source| DatasetError::Json {
            line: index + 1,
            source,
        })?;

        if item.words.len() != item.labels.len() {
            return Err(DatasetError::Malformed {
                line: index + 1,
                message: format!(
                    "{} words but {} labels",
                    item.words.len(),
                    item.labels.len()
                ),
            });
        }

        if !item.words.is_empty() {
            items.push(item);
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn reads_words_labels_and_context() {
        let lines = [
            r#"{"words": ["Jim", "bought", "AAPL"], "labels": ["B-PER", "O", "B-ORG"], "context": ["Apple", "Inc."]}"#,
            "",
            r#"{"words": ["hello"], "labels": ["O"]}"#,
        ];

        let items = parse(&lines).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].context, vec!["Apple", "Inc."]);
        assert_eq!(items[1].words, vec!["hello"]);
        assert!(items[1].context.is_empty());
    }

    #[test]
    fn reports_the_failing_line() {
        let error = parse(&[r#"{"words": ["a"], "labels": ["O"]}"#, "{not json"]).unwrap_err();

        assert!(matches!(error, DatasetError::Json { line: 2, .. }));
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let error = parse(&[r#"{"words": ["a", "b"], "labels": ["O"]}"#]).unwrap_err();

        assert!(matches!(error, DatasetError::Malformed { line: 1, .. }));
    }
}
