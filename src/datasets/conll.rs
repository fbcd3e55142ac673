use crate::datasets::{DatasetError, Item};

/// Marks a document boundary in CoNLL files
pub static DOCSTART: &str = "-DOCSTART-";

/// Parse CoNLL-style lines: one word per line with its label in the last column, and blank
/// lines between sentences
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Item>, DatasetError> {
    let mut items = Vec::new();
    let mut words = Vec::new();
    let mut labels = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref().trim();

        if line.is_empty() || line.starts_with(DOCSTART) {
            if !words.is_empty() {
                items.push(Item::new(
                    std::mem::take(&mut words),
                    std::mem::take(&mut labels),
                    Vec::new(),
                ));
            }
            continue;
        }

        let mut columns = line.split_whitespace();

        let (Some(word), Some(label)) = (columns.next(), columns.next_back()) else {
            return Err(DatasetError::Malformed {
                line: index + 1,
                message: format!("expected a word and a label, found {line:?}"),
            });
        };

        words.push(word.to_string());
        labels.push(label.to_string());
    }

    if !words.is_empty() {
        items.push(Item::new(words, labels, Vec::new()));
    }

    Ok(items)
}
