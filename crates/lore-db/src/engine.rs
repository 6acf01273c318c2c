//! Consolidation engine.
//!
//! Every public operation runs inside one `sqlx::Transaction`. Early returns
//! drop the transaction, which rolls it back, so a failed merge or retag
//! never leaves partially rewired mentions or links behind.
//!
//! Every decision about a `(owner, name, type)` identity first takes a
//! transaction-scoped advisory lock on that identity, so two requests that
//! resolve the same identity run one after the other and the second sees
//! what the first committed. Row locks follow: the node named by the
//! request, then any node it is being merged with, then their mentions,
//! then their links. Two merges that name the same pair in opposite
//! directions can still deadlock; the store aborts one of them and that
//! request fails as a whole.

use std::collections::HashSet;
use std::time::Instant;

use sqlx::{Pool, Postgres, Transaction};
use tracing::{debug, info, instrument, warn};

use lore_core::{
    char_len, cooccurrence_pairs, defaults, plan_link_rewire, plan_reattribution,
    AddMentionRequest, ChangeNodeTypeOutcome, ChangeNodeTypeRequest, ConfirmMentionRequest,
    CorrectMentionRequest, CorrectionAction, DeleteMentionRequest, Error, IngestOutcome, Mention,
    MentionSource, NewCorrection, NewMention, Node, NodeType, Note, ProposedMention, Result,
    RetagOutcome, RetagRequest, SpanKey, TextSpan, WordMatcher,
};

use crate::corrections::PgCorrectionLogRepository;
use crate::links::PgLinkRepository;
use crate::mentions::PgMentionRepository;
use crate::nodes::{ensure_owner, PgNodeRepository};
use crate::notes::{ensure_note_owner, PgNoteRepository};

/// Result of a manual add.
#[derive(Debug, Clone)]
pub struct AddMentionOutcome {
    pub mention: Mention,
    /// False when the identical mention already existed.
    pub created: bool,
}

/// Orchestrates multi-step node and mention edits.
#[derive(Clone)]
pub struct ConsolidationEngine {
    pool: Pool<Postgres>,
    nodes: PgNodeRepository,
    mentions: PgMentionRepository,
    links: PgLinkRepository,
    notes: PgNoteRepository,
    corrections: PgCorrectionLogRepository,
}

impl ConsolidationEngine {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            nodes: PgNodeRepository::new(pool.clone()),
            mentions: PgMentionRepository::new(pool.clone()),
            links: PgLinkRepository::new(pool.clone()),
            notes: PgNoteRepository::new(pool.clone()),
            corrections: PgCorrectionLogRepository::new(pool.clone()),
            pool,
        }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(Error::Database)
    }

    /// Read a note and check the caller owns it, without taking locks.
    async fn owned_note_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: i64,
        note_id: i64,
    ) -> Result<Note> {
        let note = self.notes.fetch_tx(tx, note_id).await?;
        ensure_note_owner(note, note_id, owner_id)
    }

    /// Resolve the mention's note and check the caller owns it.
    ///
    /// Runs before any row lock so a foreign mention is never locked.
    async fn authorize_mention_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_id: i64,
        mention_id: i64,
    ) -> Result<Note> {
        let note = self
            .notes
            .fetch_for_mention_tx(tx, mention_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Mention {}", mention_id)))?;
        if note.owner_id != owner_id {
            return Err(Error::Forbidden(format!(
                "Mention {} belongs to another user's note",
                mention_id
            )));
        }
        Ok(note)
    }

    async fn lock_mention_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mention_id: i64,
    ) -> Result<Mention> {
        self.mentions
            .lock_tx(tx, mention_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Mention {}", mention_id)))
    }

    // =========================================================================
    // NODE TYPE CHANGE
    // =========================================================================

    /// Change a node's type, merging it into an existing node when the new
    /// identity is already taken.
    #[instrument(
        skip(self, req),
        fields(
            subsystem = "engine",
            component = "consolidation",
            op = "change_node_type",
            owner_id = req.owner_id,
            node_id = req.node_id,
            node_type = %req.new_type,
        )
    )]
    pub async fn change_node_type(
        &self,
        req: ChangeNodeTypeRequest,
    ) -> Result<ChangeNodeTypeOutcome> {
        let start = Instant::now();
        let mut tx = self.begin().await?;

        // Names never change, so the target identity is known before any
        // row lock is taken.
        let seen = self
            .nodes
            .fetch_tx(&mut tx, req.node_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Node {}", req.node_id)))?;
        let seen = ensure_owner(seen, req.owner_id)?;
        self.nodes
            .lock_identity_tx(&mut tx, req.owner_id, &seen.name, req.new_type)
            .await?;

        let node = self
            .nodes
            .lock_tx(&mut tx, req.node_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Node {}", req.node_id)))?;

        let survivor = if node.node_type == req.new_type {
            None
        } else {
            self.nodes
                .lock_by_identity_tx(&mut tx, req.owner_id, &node.name, req.new_type)
                .await?
        };

        let survivor = match survivor {
            Some(survivor) => Some(survivor),
            None => self.update_type_or_find_survivor_tx(&mut tx, &node, &req).await?,
        };

        let outcome = match survivor {
            None => {
                debug!(node_id = node.id, "No identity collision, type updated in place");
                ChangeNodeTypeOutcome::Updated { node_id: node.id }
            }
            Some(survivor) => self.merge_tx(&mut tx, &node, &survivor, &req).await?,
        };

        tx.commit().await.map_err(Error::Database)?;

        info!(
            merged = outcome.is_merge(),
            canonical_node_id = outcome.canonical_node_id(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Node type changed"
        );
        Ok(outcome)
    }

    /// Update the node's type in place, unless a writer outside the engine
    /// committed the same identity meanwhile.
    ///
    /// The update runs under a savepoint. When it hits the identity
    /// constraint the savepoint is rolled back and the now visible node is
    /// returned as the merge survivor.
    async fn update_type_or_find_survivor_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        node: &Node,
        req: &ChangeNodeTypeRequest,
    ) -> Result<Option<Node>> {
        let flags = req.flags.resolve(req.new_type, node.flags());
        let mut savepoint = sqlx::Connection::begin(&mut **tx)
            .await
            .map_err(Error::Database)?;

        match self
            .nodes
            .update_type_tx(&mut savepoint, node.id, req.new_type, flags)
            .await
        {
            Ok(()) => {
                savepoint.commit().await.map_err(Error::Database)?;
                Ok(None)
            }
            Err(Error::Conflict(msg)) => {
                savepoint.rollback().await.map_err(Error::Database)?;
                debug!(node_id = node.id, conflict = %msg, "Identity committed concurrently");
                let survivor = self
                    .nodes
                    .lock_by_identity_tx(tx, req.owner_id, &node.name, req.new_type)
                    .await?
                    .ok_or(Error::Conflict(msg))?;
                Ok(Some(survivor))
            }
            Err(e) => Err(e),
        }
    }

    /// Fold `absorbed` into `survivor` and delete it.
    async fn merge_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        absorbed: &Node,
        survivor: &Node,
        req: &ChangeNodeTypeRequest,
    ) -> Result<ChangeNodeTypeOutcome> {
        debug!(
            absorbed_node_id = absorbed.id,
            target_node_id = survivor.id,
            "Identity taken, merging"
        );

        let moving = self.mentions.lock_for_nodes_tx(tx, &[absorbed.id]).await?;
        let covered = self.mentions.span_keys_tx(tx, survivor.id).await?;
        let plan = plan_reattribution(covered, &moving);
        self.mentions.delete_many_tx(tx, &plan.discard).await?;
        let mentions_moved = self
            .mentions
            .reassign_tx(tx, &plan.reassign, survivor.id, req.new_type)
            .await?;

        let links = self
            .links
            .lock_touching_tx(tx, &[absorbed.id, survivor.id])
            .await?;
        let rewire = plan_link_rewire(absorbed.id, survivor.id, &links);
        let links_dropped = self.links.delete_many_tx(tx, &rewire.drop).await?;
        for repoint in &rewire.repoint {
            self.links.repoint_tx(tx, repoint).await?;
        }

        let flags = req.flags.resolve(req.new_type, survivor.flags());
        self.nodes.set_flags_tx(tx, survivor, flags).await?;
        self.nodes.delete_tx(tx, absorbed.id).await?;

        Ok(ChangeNodeTypeOutcome::Merged {
            target_node_id: survivor.id,
            absorbed_node_id: absorbed.id,
            mentions_moved,
            links_repointed: rewire.repoint.len() as u64,
            links_dropped,
        })
    }

    // =========================================================================
    // RETAG EVERYWHERE
    // =========================================================================

    /// Make every occurrence of a name resolve to one node of the given type.
    ///
    /// Nodes with the same name and another type keep existing, possibly
    /// with no mentions left.
    #[instrument(
        skip(self, req),
        fields(
            subsystem = "engine",
            component = "consolidation",
            op = "retag_everywhere",
            owner_id = req.owner_id,
            node_type = %req.node_type,
        )
    )]
    pub async fn retag_everywhere(&self, req: RetagRequest) -> Result<RetagOutcome> {
        let start = Instant::now();
        let name = req.name.trim();
        let matcher = WordMatcher::new(name)?;
        let mut tx = self.begin().await?;

        let (target, target_node_is_new) = self
            .nodes
            .find_or_create_tx(&mut tx, req.owner_id, name, req.node_type)
            .await?;
        let flags = req.flags.resolve(req.node_type, target.flags());
        self.nodes.set_flags_tx(&mut tx, &target, flags).await?;

        let obsolete = self
            .nodes
            .lock_other_types_tx(&mut tx, req.owner_id, name, req.node_type)
            .await?;
        let obsolete_node_ids: Vec<i64> = obsolete.iter().map(|n| n.id).collect();

        let stale = self
            .mentions
            .lock_for_nodes_tx(&mut tx, &obsolete_node_ids)
            .await?;
        let covered = self.mentions.span_keys_tx(&mut tx, target.id).await?;
        let plan = plan_reattribution(covered.iter().copied(), &stale);
        let mentions_reassigned = self
            .mentions
            .reassign_tx(&mut tx, &plan.reassign, target.id, req.node_type)
            .await?;
        let mentions_discarded = self.mentions.delete_many_tx(&mut tx, &plan.discard).await?;

        debug!(
            target_node_id = target.id,
            obsolete = obsolete_node_ids.len(),
            mentions_reassigned,
            mentions_discarded,
            "Existing mentions reattributed"
        );

        let reassigned: HashSet<i64> = plan.reassign.iter().copied().collect();
        let mut covered: HashSet<SpanKey> = covered.into_iter().collect();
        covered.extend(
            stale
                .iter()
                .filter(|m| reassigned.contains(&m.id))
                .map(SpanKey::of),
        );

        let candidates = self
            .notes
            .search_candidates_tx(&mut tx, req.owner_id, name)
            .await?;
        let mut new_mentions_created = 0;
        for note in &candidates {
            for span in matcher.spans(&note.content) {
                let key = SpanKey {
                    note_id: note.id,
                    start: span.start,
                    end: span.end,
                };
                if !covered.insert(key) {
                    continue;
                }
                let inserted = self
                    .mentions
                    .insert_tx(
                        &mut tx,
                        &NewMention {
                            node_id: target.id,
                            note_id: note.id,
                            span,
                            mention_type: req.node_type,
                            source: MentionSource::RetagEverywhere,
                            confidence: defaults::USER_CONFIDENCE,
                        },
                    )
                    .await?;
                if inserted.is_some() {
                    new_mentions_created += 1;
                }
            }
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            target_node_id = target.id,
            target_node_is_new,
            mentions_reassigned,
            mentions_discarded,
            mentions_created = new_mentions_created,
            candidate_notes = candidates.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Retag everywhere complete"
        );

        Ok(RetagOutcome {
            target_node_id: target.id,
            target_node_is_new,
            mentions_reassigned,
            mentions_discarded,
            new_mentions_created,
            obsolete_node_ids,
        })
    }

    // =========================================================================
    // MANUAL MENTIONS
    // =========================================================================

    /// Tag a span of a note by hand.
    #[instrument(
        skip(self, req),
        fields(
            subsystem = "engine",
            component = "consolidation",
            op = "add_mention",
            owner_id = req.owner_id,
            note_id = req.note_id,
            node_type = %req.node_type,
        )
    )]
    pub async fn add_mention(&self, req: AddMentionRequest) -> Result<AddMentionOutcome> {
        let name = req.name_segment.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("name_segment must not be empty".to_string()));
        }
        let mut tx = self.begin().await?;

        let note = self.owned_note_tx(&mut tx, req.owner_id, req.note_id).await?;
        req.span.check_within(char_len(&note.content))?;

        let (node, _) = self
            .nodes
            .find_or_create_tx(&mut tx, req.owner_id, name, req.node_type)
            .await?;
        let flags = req.flags.resolve(req.node_type, node.flags());
        self.nodes.set_flags_tx(&mut tx, &node, flags).await?;

        let inserted = self
            .mentions
            .insert_tx(
                &mut tx,
                &NewMention {
                    node_id: node.id,
                    note_id: note.id,
                    span: req.span,
                    mention_type: req.node_type,
                    source: MentionSource::UserAdded,
                    confidence: defaults::USER_CONFIDENCE,
                },
            )
            .await?;
        let created = inserted.is_some();
        let mention = match inserted {
            Some(mention) => mention,
            None => self
                .mentions
                .find_at_span_tx(&mut tx, note.id, node.id, req.span)
                .await?
                .ok_or_else(|| {
                    Error::Internal("Duplicate mention vanished during insert".to_string())
                })?,
        };

        self.corrections
            .append_tx(
                &mut tx,
                &NewCorrection {
                    note_id: note.id,
                    mention_id: Some(mention.id),
                    original_text_segment: None,
                    original_mention_type: None,
                    original_source: None,
                    original_confidence: None,
                    corrected_text_segment: Some(name.to_string()),
                    corrected_mention_type: Some(req.node_type.to_string()),
                    action: CorrectionAction::AddTag,
                    actor_id: req.owner_id,
                },
            )
            .await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            mention_id = mention.id,
            node_id = node.id,
            created,
            "Mention added"
        );
        Ok(AddMentionOutcome { mention, created })
    }

    /// Point a mention at a different name, type, or span.
    ///
    /// If the corrected mention would duplicate one that already exists, the
    /// corrected row is removed and the existing one is returned.
    #[instrument(
        skip(self, req),
        fields(
            subsystem = "engine",
            component = "consolidation",
            op = "correct_mention",
            owner_id = req.owner_id,
            mention_id = req.mention_id,
            note_id = req.note_id,
        )
    )]
    pub async fn correct_mention(&self, req: CorrectMentionRequest) -> Result<Mention> {
        let mut tx = self.begin().await?;

        let note = self
            .authorize_mention_tx(&mut tx, req.owner_id, req.mention_id)
            .await?;
        if note.id != req.note_id {
            return Err(Error::InvalidInput(format!(
                "Mention {} does not belong to note {}",
                req.mention_id, req.note_id
            )));
        }
        let mention = self.lock_mention_tx(&mut tx, req.mention_id).await?;

        let span = req.span.unwrap_or_else(|| mention.span());
        span.check_within(char_len(&note.content))?;

        let original_text = mention
            .span()
            .slice(&note.content)
            .map(str::to_string)
            .or_else(|| req.original_text_segment.clone());
        let name = req
            .new_name_segment
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| original_text.clone())
            .ok_or_else(|| {
                Error::InvalidInput(
                    "new_name_segment or original_text_segment is required".to_string(),
                )
            })?;

        let (target, _) = self
            .nodes
            .find_or_create_tx(&mut tx, req.owner_id, &name, req.new_type)
            .await?;

        let duplicate = if target.id != mention.node_id || span != mention.span() {
            self.mentions
                .find_at_span_tx(&mut tx, note.id, target.id, span)
                .await?
                .filter(|existing| existing.id != mention.id)
        } else {
            None
        };

        let corrected = match duplicate {
            Some(existing) => {
                debug!(
                    existing_mention_id = existing.id,
                    "Correction duplicates an existing mention, collapsing"
                );
                self.mentions.delete_tx(&mut tx, mention.id).await?;
                self.mentions
                    .set_source_tx(
                        &mut tx,
                        existing.id,
                        &MentionSource::UserModified,
                        defaults::USER_CONFIDENCE,
                    )
                    .await?
            }
            None => {
                self.mentions
                    .update_tx(
                        &mut tx,
                        mention.id,
                        target.id,
                        req.new_type,
                        span,
                        &MentionSource::UserModified,
                        defaults::USER_CONFIDENCE,
                    )
                    .await?
            }
        };

        self.corrections
            .append_tx(
                &mut tx,
                &NewCorrection {
                    note_id: note.id,
                    mention_id: Some(mention.id),
                    original_text_segment: original_text,
                    original_mention_type: Some(mention.mention_type.to_string()),
                    original_source: Some(mention.source.to_string()),
                    original_confidence: Some(mention.confidence),
                    corrected_text_segment: Some(name),
                    corrected_mention_type: Some(req.new_type.to_string()),
                    action: CorrectionAction::Modify,
                    actor_id: req.owner_id,
                },
            )
            .await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            node_id = corrected.node_id,
            previous_node_id = mention.node_id,
            "Mention corrected"
        );
        Ok(corrected)
    }

    /// Mark a machine-proposed mention as reviewed by a human.
    #[instrument(
        skip(self, req),
        fields(
            subsystem = "engine",
            component = "consolidation",
            op = "confirm_mention",
            owner_id = req.owner_id,
            mention_id = req.mention_id,
        )
    )]
    pub async fn confirm_mention(&self, req: ConfirmMentionRequest) -> Result<Mention> {
        let mut tx = self.begin().await?;

        let note = self
            .authorize_mention_tx(&mut tx, req.owner_id, req.mention_id)
            .await?;
        let mention = self.lock_mention_tx(&mut tx, req.mention_id).await?;

        let confirmed = self
            .mentions
            .set_source_tx(
                &mut tx,
                mention.id,
                &MentionSource::UserConfirmed,
                defaults::USER_CONFIDENCE,
            )
            .await?;

        let text = mention.span().slice(&note.content).map(str::to_string);
        self.corrections
            .append_tx(
                &mut tx,
                &NewCorrection {
                    note_id: note.id,
                    mention_id: Some(mention.id),
                    original_text_segment: text.clone(),
                    original_mention_type: Some(mention.mention_type.to_string()),
                    original_source: Some(mention.source.to_string()),
                    original_confidence: Some(mention.confidence),
                    corrected_text_segment: text,
                    corrected_mention_type: Some(mention.mention_type.to_string()),
                    action: CorrectionAction::ConfirmTag,
                    actor_id: req.owner_id,
                },
            )
            .await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(note_id = note.id, "Mention confirmed");
        Ok(confirmed)
    }

    /// Remove a mention, logging what it was.
    ///
    /// A mention that does not exist is `NotFound` and nothing is logged.
    #[instrument(
        skip(self, req),
        fields(
            subsystem = "engine",
            component = "consolidation",
            op = "delete_mention",
            owner_id = req.owner_id,
            mention_id = req.mention_id,
        )
    )]
    pub async fn delete_mention(&self, req: DeleteMentionRequest) -> Result<()> {
        let mut tx = self.begin().await?;

        let note = self
            .authorize_mention_tx(&mut tx, req.owner_id, req.mention_id)
            .await?;
        let mention = self.lock_mention_tx(&mut tx, req.mention_id).await?;

        self.corrections
            .append_tx(
                &mut tx,
                &NewCorrection {
                    note_id: note.id,
                    mention_id: Some(mention.id),
                    original_text_segment: mention
                        .span()
                        .slice(&note.content)
                        .map(str::to_string)
                        .or(req.original_text_segment),
                    original_mention_type: Some(mention.mention_type.to_string()),
                    original_source: Some(mention.source.to_string()),
                    original_confidence: Some(mention.confidence),
                    corrected_text_segment: None,
                    corrected_mention_type: None,
                    action: CorrectionAction::DeleteTag,
                    actor_id: req.owner_id,
                },
            )
            .await?;
        self.mentions.delete_tx(&mut tx, mention.id).await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(note_id = note.id, node_id = mention.node_id, "Mention deleted");
        Ok(())
    }

    // =========================================================================
    // TAGGER INGESTION
    // =========================================================================

    /// Persist the tagger's proposals for one note.
    ///
    /// Proposals with an unknown type, an empty name, or a span outside the
    /// note are skipped. Every ordered pair of distinct proposed nodes gets a
    /// co-occurrence link scoped to the note.
    #[instrument(
        skip(self, proposals),
        fields(
            subsystem = "engine",
            component = "ingest",
            op = "ingest_proposals",
            proposal_count = proposals.len(),
        )
    )]
    pub async fn ingest_proposals(
        &self,
        owner_id: i64,
        note_id: i64,
        proposals: &[ProposedMention],
    ) -> Result<IngestOutcome> {
        let start = Instant::now();
        let mut tx = self.begin().await?;

        let note = self.owned_note_tx(&mut tx, owner_id, note_id).await?;
        let note_len = char_len(&note.content);

        let mut outcome = IngestOutcome::default();
        let mut node_ids = Vec::with_capacity(proposals.len());

        for proposal in proposals {
            let accepted = NodeType::parse(&proposal.node_type).and_then(|node_type| {
                let span = TextSpan::new(proposal.start, proposal.end)?;
                span.check_within(note_len)?;
                Ok((node_type, span))
            });
            let (node_type, span) = match accepted {
                Ok(accepted) if !proposal.name.trim().is_empty() => accepted,
                Ok(_) => {
                    warn!(start = proposal.start, "Skipping proposal with empty name");
                    outcome.proposals_skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        name = %proposal.name,
                        node_type = %proposal.node_type,
                        error = %e,
                        "Skipping invalid proposal"
                    );
                    outcome.proposals_skipped += 1;
                    continue;
                }
            };

            let (node, created) = self
                .nodes
                .find_or_create_tx(&mut tx, owner_id, &proposal.name, node_type)
                .await?;
            if created {
                outcome.nodes_created += 1;
            }

            let source = proposal
                .source
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| defaults::TAGGER_SOURCE.to_string());
            let confidence = proposal
                .confidence
                .filter(|c| c.is_finite())
                .unwrap_or(defaults::TAGGER_CONFIDENCE)
                .clamp(0.0, 1.0);

            let inserted = self
                .mentions
                .insert_tx(
                    &mut tx,
                    &NewMention {
                        node_id: node.id,
                        note_id: note.id,
                        span,
                        mention_type: node_type,
                        source: MentionSource::from(source),
                        confidence,
                    },
                )
                .await?;
            if inserted.is_some() {
                outcome.mentions_created += 1;
            }
            node_ids.push(node.id);
        }

        for (source, target) in cooccurrence_pairs(&node_ids) {
            if self
                .links
                .insert_tx(&mut tx, source, target, Some(note.id))
                .await?
            {
                outcome.links_created += 1;
            }
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            nodes_created = outcome.nodes_created,
            mentions_created = outcome.mentions_created,
            links_created = outcome.links_created,
            proposals_skipped = outcome.proposals_skipped,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tagger proposals ingested"
        );
        Ok(outcome)
    }
}
