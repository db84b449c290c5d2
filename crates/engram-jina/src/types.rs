// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response types for the Jina embeddings API.

use serde::{Deserialize, Serialize};

/// Request body for `POST /v1/embeddings`.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsRequest {
    /// Model identifier, e.g. `jina-embeddings-v5-text-small`.
    pub model: String,
    /// Task hint: `query` or `text-matching`.
    pub task: String,
    /// Texts to embed; one output row per input.
    pub input: Vec<String>,
}

/// Response body for `POST /v1/embeddings`.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsResponse {
    pub data: Vec<EmbeddingRow>,
}

/// One embedding row; `index` ties it back to the input position.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRow {
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Error body returned by the API on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialises_expected_shape() {
        let req = EmbeddingsRequest {
            model: "jina-embeddings-v5-text-small".into(),
            task: "query".into(),
            input: vec!["hello".into()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "jina-embeddings-v5-text-small");
        assert_eq!(json["task"], "query");
        assert_eq!(json["input"][0], "hello");
    }

    #[test]
    fn response_deserialises() {
        let body = r#"{"data":[{"index":0,"embedding":[0.1,0.2]},{"index":1,"embedding":[0.3,0.4]}]}"#;
        let resp: EmbeddingsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.data.len(), 2);
        assert_eq!(resp.data[1].embedding, vec![0.3, 0.4]);
    }
}
