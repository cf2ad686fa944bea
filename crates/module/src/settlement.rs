//! End-of-run settlement.

use std::collections::HashMap;

use auction_types::{normalize_name, ManualOutcome, MemberSpend, SettlementPayload, SettlementRecord};
use tracing::{error, info, warn};

use crate::service::{LedgerError, LedgerService};

/// Per-member spend over every known member.
///
/// Members without a win get 0. Winners missing from `members` are appended so
/// no sale is dropped from the settlement.
pub fn build_results(members: &[String], records: &[SettlementRecord]) -> Vec<MemberSpend> {
    let mut spent: HashMap<String, u64> = HashMap::new();
    for record in records {
        *spent.entry(record.winner.ledger_key()).or_insert(0) += record.amount;
    }

    let mut results: Vec<MemberSpend> = Vec::with_capacity(members.len());
    for member in members {
        let key = normalize_name(member);
        let total_spent = spent.remove(&key).unwrap_or(0);
        results.push(MemberSpend {
            member: member.clone(),
            total_spent,
        });
    }

    for record in records {
        if let Some(total_spent) = spent.remove(&record.winner.ledger_key()) {
            warn!(member = %record.winner.display_name, total_spent, "Winner missing from point snapshot");
            results.push(MemberSpend {
                member: record.winner.display_name.clone(),
                total_spent,
            });
        }
    }
    results
}

/// Result of a settlement attempt. The payload is kept either way so an
/// operator can reconcile by hand.
#[derive(Debug)]
pub struct SettlementOutcome {
    pub payload: SettlementPayload,
    pub submitted: Result<(), LedgerError>,
}

/// One-line summary of what a payload charges, for manual reconciliation.
pub fn spend_summary(payload: &SettlementPayload) -> String {
    let spent: Vec<String> = payload
        .results
        .iter()
        .filter(|r| r.total_spent > 0)
        .map(|r| format!("{}={}", r.member, r.total_spent))
        .collect();
    let spent = if spent.is_empty() {
        "none".to_string()
    } else {
        spent.join(", ")
    };
    format!(
        "session {}, spent: {}, manual outcomes: {}",
        payload.session_timestamp,
        spent,
        payload.manual_outcomes.len()
    )
}

/// Builds and submits the settlement of a finished run.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Fetch a fresh member list, tally spend and submit in one call.
    ///
    /// When the fresh fetch fails, `cached_members` is used instead.
    pub async fn finalize<L: LedgerService + ?Sized>(
        service: &L,
        cached_members: Vec<String>,
        records: &[SettlementRecord],
        manual_outcomes: Vec<ManualOutcome>,
        session_timestamp: String,
    ) -> SettlementOutcome {
        let members = match service.get_points().await {
            Ok(points) => points.into_keys().collect(),
            Err(e) => {
                warn!(error = %e, "Fresh point fetch failed; settling against cached members");
                cached_members
            }
        };

        let payload = SettlementPayload {
            session_timestamp,
            results: build_results(&members, records),
            manual_outcomes,
        };

        let submitted = service.submit_settlement(payload.clone()).await;
        match &submitted {
            Ok(()) => info!(
                members = payload.results.len(),
                sold = records.len(),
                manual = payload.manual_outcomes.len(),
                "Settlement submitted"
            ),
            Err(e) => error!(error = %e, "Settlement submission failed; reconcile manually"),
        }

        SettlementOutcome { payload, submitted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_types::{ItemSource, Member};

    fn sale(item: &str, winner: &str, amount: u64) -> SettlementRecord {
        SettlementRecord {
            item: item.into(),
            winner: Member::new(winner, winner),
            amount,
            source: ItemSource::ExternalCatalog,
            catalog_index: None,
        }
    }

    #[test]
    fn test_totals_cover_all_members() {
        let members = vec!["Alice".to_string(), "Bob".to_string()];
        let records = vec![sale("Item A", "Alice", 100), sale("Item B", "alice", 50)];

        let results = build_results(&members, &records);
        assert_eq!(
            results,
            vec![
                MemberSpend {
                    member: "Alice".into(),
                    total_spent: 150
                },
                MemberSpend {
                    member: "Bob".into(),
                    total_spent: 0
                },
            ]
        );
    }

    #[test]
    fn test_unknown_winner_appended_once() {
        let records = vec![sale("A", "Dave", 10), sale("B", "DAVE", 5)];
        let results = build_results(&["Alice".to_string()], &records);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].member, "Dave");
        assert_eq!(results[1].total_spent, 15);
    }

    #[test]
    fn test_spend_summary_lists_charged_members() {
        let payload = SettlementPayload {
            session_timestamp: "10/14/26 21:30".into(),
            results: build_results(
                &["Alice".to_string(), "Bob".to_string()],
                &[sale("A", "Alice", 170)],
            ),
            manual_outcomes: Vec::new(),
        };
        assert_eq!(
            spend_summary(&payload),
            "session 10/14/26 21:30, spent: Alice=170, manual outcomes: 0"
        );

        let empty = SettlementPayload {
            results: Vec::new(),
            ..payload
        };
        assert!(spend_summary(&empty).contains("spent: none"));
    }
}
