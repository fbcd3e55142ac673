use std::fmt::Display;

/// bert-base-uncased
pub const BERT_BASE_UNCASED: &str = "bert-base-uncased";

/// bert-base-cased
pub const BERT_BASE_CASED: &str = "bert-base-cased";

/// bert-large-cased
pub const BERT_LARGE_CASED: &str = "bert-large-cased";

/// bert-base-multilingual-cased
pub const BERT_BASE_MULTILINGUAL_CASED: &str = "bert-base-multilingual-cased";

/// roberta-base
pub const ROBERTA_BASE: &str = "roberta-base";

/// roberta-large
pub const ROBERTA_LARGE: &str = "roberta-large";

/// All available BERT-architecture models
pub static ALL_MODELS: &[&str; 6] = &[
    BERT_BASE_UNCASED,
    BERT_BASE_CASED,
    BERT_LARGE_CASED,
    BERT_BASE_MULTILINGUAL_CASED,
    ROBERTA_BASE,
    ROBERTA_LARGE,
];

/// Available Models
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Model {
    /// The BERT family of models, with the specific model name contained within
    Bert(String),
}

impl Model {
    /// Get the model type
    pub fn model_type(&self) -> &str {
        match self {
            Model::Bert(_) => "bert",
        }
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Model::Bert(name) = self;

        write!(f, "{}", name)
    }
}

impl TryFrom<&str> for Model {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if ALL_MODELS.contains(&value) {
            Ok(Model::Bert(value.to_string()))
        } else {
            Err(ModelError::Unknown(value.to_string()))
        }
    }
}

/// Model Error
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// No model found for the given string
    #[error("no model found for {0}")]
    Unknown(String),
}
