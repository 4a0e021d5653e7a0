//! Batch evaluation over a question set.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkId;
use crate::embedding::Embed;
use crate::error::{RAGError, Result};
use crate::generation::Generate;
use crate::query::{QueryResponse, QueryRouter};

pub const DEFAULT_QUESTION_SET: &str = "./query_temp.json";
pub const DEFAULT_OUTPUT: &str = "output_4.json";

/// One input question. All three fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    pub stock: String,
    pub expected_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub expected_answer: String,
    pub stock: String,
    pub response: String,
    pub sources: Vec<ChunkId>,
}

impl EvaluationRecord {
    fn new(record: &QuestionRecord, result: QueryResponse) -> Self {
        Self {
            question: record.question.clone(),
            expected_answer: record.expected_answer.clone(),
            stock: record.stock.clone(),
            response: result.response,
            sources: result.sources,
        }
    }
}

pub fn load_question_set(path: &Path) -> Result<Vec<QuestionRecord>> {
    let raw = fs::read_to_string(path).map_err(|e| RAGError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Progress hooks, called around each record in order.
pub trait EvaluationObserver {
    fn started(&mut self, _index: usize, _record: &QuestionRecord) {}
    fn answered(&mut self, _index: usize, _record: &EvaluationRecord) {}
}

impl EvaluationObserver for () {}

/// Runs every question through the router; the first failure aborts the run.
pub fn evaluate<E: Embed, G: Generate, O: EvaluationObserver>(
    router: &mut QueryRouter<'_, E, G>,
    questions: &[QuestionRecord],
    observer: &mut O,
) -> Result<Vec<EvaluationRecord>> {
    let mut results = Vec::with_capacity(questions.len());
    for (i, record) in questions.iter().enumerate() {
        observer.started(i, record);
        let answer = router.query(&record.question, &record.stock)?;
        let evaluated = EvaluationRecord::new(record, answer);
        observer.answered(i, &evaluated);
        results.push(evaluated);
    }
    log::info!("evaluated {} questions", results.len());
    Ok(results)
}
