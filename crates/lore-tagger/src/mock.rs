//! Deterministic tagger for tests.
//!
//! ```rust,ignore
//! use lore_tagger::mock::MockTagger;
//! use lore_tagger::Tagger;
//!
//! let tagger = MockTagger::new().with_entity("Aria", "PERSON");
//! assert_eq!(tagger.name(), "mock");
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lore_core::{find_word_spans, Error, ProposedMention, Result, TagRequest, Tagger};

#[derive(Debug, Clone, Default)]
struct MockConfig {
    fixed: Vec<ProposedMention>,
    entities: Vec<(String, String)>,
    failure: Option<String>,
    confidence: Option<f32>,
}

/// Tagger that proposes known names wherever they appear as whole words.
#[derive(Clone, Default)]
pub struct MockTagger {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<TagRequest>>>,
}

impl MockTagger {
    /// A tagger that proposes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose every whole-word occurrence of `name` with the given type label.
    pub fn with_entity(mut self, name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .entities
            .push((name.into(), node_type.into()));
        self
    }

    /// Return these proposals verbatim on every call, before any entity matches.
    pub fn with_proposals(mut self, proposals: Vec<ProposedMention>) -> Self {
        Arc::make_mut(&mut self.config).fixed = proposals;
        self
    }

    /// Confidence attached to entity matches.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        Arc::make_mut(&mut self.config).confidence = Some(confidence);
        self
    }

    /// Fail every call with [`Error::Tagger`].
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).failure = Some(message.into());
        self
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<TagRequest> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl Tagger for MockTagger {
    async fn tag(&self, req: &TagRequest) -> Result<Vec<ProposedMention>> {
        self.call_log.lock().unwrap().push(req.clone());

        if let Some(message) = &self.config.failure {
            return Err(Error::Tagger(message.clone()));
        }

        let mut proposals = self.config.fixed.clone();
        for (name, node_type) in &self.config.entities {
            for span in find_word_spans(name, &req.text)? {
                proposals.push(ProposedMention {
                    name: name.clone(),
                    node_type: node_type.clone(),
                    start: span.start,
                    end: span.end,
                    confidence: self.config.confidence,
                    source: Some("MOCK".to_string()),
                });
            }
        }
        Ok(proposals)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.config.failure.is_none())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> TagRequest {
        TagRequest {
            note_id: 1,
            text: text.to_string(),
            user_id: 9,
        }
    }

    #[tokio::test]
    async fn test_mock_proposes_whole_word_matches() {
        let tagger = MockTagger::new()
            .with_entity("Aria", "PERSON")
            .with_entity("Bree", "LOCATION")
            .with_confidence(0.8);

        let proposals = tagger
            .tag(&request("Aria left Bree. Ariadne stayed with aria."))
            .await
            .unwrap();

        let spans: Vec<(&str, i32, i32)> = proposals
            .iter()
            .map(|p| (p.node_type.as_str(), p.start, p.end))
            .collect();
        assert_eq!(
            spans,
            vec![("PERSON", 0, 4), ("PERSON", 36, 40), ("LOCATION", 10, 14)]
        );
        assert!(proposals.iter().all(|p| p.confidence == Some(0.8)));
        assert_eq!(tagger.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_fixed_proposals() {
        let fixed = ProposedMention {
            name: "Orb".to_string(),
            node_type: "ITEM".to_string(),
            start: 0,
            end: 3,
            confidence: None,
            source: None,
        };
        let tagger = MockTagger::new().with_proposals(vec![fixed.clone()]);
        let proposals = tagger.tag(&request("Orb")).await.unwrap();
        assert_eq!(proposals, vec![fixed]);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let tagger = MockTagger::new().failing("tagger down");
        let err = tagger.tag(&request("anything")).await.unwrap_err();
        assert!(matches!(err, Error::Tagger(ref m) if m == "tagger down"));
        assert!(!tagger.health_check().await.unwrap());
        assert_eq!(tagger.calls()[0].user_id, 9);
    }
}
