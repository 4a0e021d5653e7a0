use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::config::EmbeddingConfig;
use crate::error::{RAGError, Result};

/// Turns text into vectors. Documents and queries are separate calls because some
/// models expect different prefixes for each side.
pub trait Embed {
    fn embed_documents(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>>;

    /// Name recorded alongside persisted vectors.
    fn model_name(&self) -> &str;
}

/// Local ONNX embedding via fastembed.
pub struct Embedder {
    model: TextEmbedding,
    name: String,
    batch_size: usize,
    e5_prefixes: bool,
}

impl Embedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = resolve_model(&config.model)?;
        let mut options = InitOptions::new(model).with_show_download_progress(true);
        if let Some(dir) = &config.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }

        log::info!("loading embedding model {}", config.model);
        let model = TextEmbedding::try_new(options).map_err(|e| RAGError::ModelInit(e.to_string()))?;

        Ok(Self {
            model,
            name: config.model.clone(),
            batch_size: config.batch_size,
            e5_prefixes: is_e5(&config.model),
        })
    }

    fn run(&mut self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let vectors = self
            .model
            .embed(texts, Some(self.batch_size))
            .map_err(|e| RAGError::Embedding(e.to_string()))?;
        if vectors.len() != expected {
            return Err(RAGError::Embedding(format!(
                "model returned {} vectors for {} inputs",
                vectors.len(),
                expected
            )));
        }
        Ok(vectors)
    }
}

impl Embed for Embedder {
    fn embed_documents(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs = if self.e5_prefixes {
            texts.iter().map(|t| format!("passage: {t}")).collect()
        } else {
            texts.to_vec()
        };
        self.run(inputs)
    }

    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        let input = if self.e5_prefixes {
            format!("query: {text}")
        } else {
            text.to_string()
        };
        self.run(vec![input])?
            .pop()
            .ok_or(RAGError::EmptyEmbeddings)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

fn is_e5(name: &str) -> bool {
    name.to_ascii_lowercase().contains("e5")
}

fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    let model = match name.to_ascii_lowercase().as_str() {
        "multilingual-e5-large" | "intfloat/multilingual-e5-large" => {
            EmbeddingModel::MultilingualE5Large
        }
        "multilingual-e5-base" | "intfloat/multilingual-e5-base" => {
            EmbeddingModel::MultilingualE5Base
        }
        "multilingual-e5-small" | "intfloat/multilingual-e5-small" => {
            EmbeddingModel::MultilingualE5Small
        }
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        other => {
            return Err(RAGError::Config(format!(
                "unsupported embedding model '{other}'"
            )));
        }
    };
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_resolve() {
        assert!(resolve_model("multilingual-e5-large").is_ok());
        assert!(resolve_model("BAAI/bge-small-en-v1.5").is_ok());
        assert!(matches!(
            resolve_model("text-davinci"),
            Err(RAGError::Config(_))
        ));
    }

    #[test]
    fn only_e5_models_get_prefixes() {
        assert!(is_e5("multilingual-e5-large"));
        assert!(!is_e5("all-minilm-l6-v2"));
    }
}
