//! Impact analyzer (spec §4.H): bounded BFS over the reverse reference
//! graph with a risk classification.

use std::collections::{HashSet, VecDeque};

use crate::graph::ReferenceGraph;
use crate::model::{FileRecord, Id, Symbol};

pub const MAX_DEPTH: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactType {
    Direct,
    Transitive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactedSymbol {
    pub symbol_id: Id,
    pub distance: u32,
    pub impact_type: ImpactType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct ImpactedFile {
    pub file_id: Id,
    pub affected_symbol_ids: Vec<Id>,
}

#[derive(Debug, Clone)]
pub struct ImpactReport {
    pub changed_symbols: Vec<Id>,
    pub impacted_symbols: Vec<ImpactedSymbol>,
    pub impacted_files: Vec<ImpactedFile>,
    pub risk_level: RiskLevel,
    pub risk_explanation: String,
}

/// Runs BFS over `incoming` references starting from `changed_symbols`, up
/// to [`MAX_DEPTH`] hops, then classifies risk.
pub fn analyze_impact(
    graph: &ReferenceGraph,
    changed_symbols: &[Id],
    all_symbols: &[Symbol],
) -> ImpactReport {
    let changed_set: HashSet<Id> = changed_symbols.iter().cloned().collect();
    let mut visited: HashSet<Id> = changed_set.clone();
    let mut impacted_symbols = Vec::new();

    let mut frontier: Vec<Id> = changed_symbols.to_vec();
    let mut distance = 0u32;

    while !frontier.is_empty() && distance < MAX_DEPTH {
        distance += 1;
        let incoming = graph.incoming_batch(&frontier);
        let mut next_frontier = Vec::new();

        for reference in incoming {
            let candidate = reference.from_symbol_id.clone();
            if visited.insert(candidate.clone()) {
                let impact_type = if distance == 1 {
                    ImpactType::Direct
                } else {
                    ImpactType::Transitive
                };
                impacted_symbols.push(ImpactedSymbol {
                    symbol_id: candidate.clone(),
                    distance,
                    impact_type,
                });
                next_frontier.push(candidate);
            }
        }

        frontier = next_frontier;
    }

    let impacted_files = files_for_symbols(&impacted_symbols, all_symbols);
    let (risk_level, risk_explanation) =
        classify_risk(impacted_files.len(), impacted_symbols.len());

    ImpactReport {
        changed_symbols: changed_symbols.to_vec(),
        impacted_symbols,
        impacted_files,
        risk_level,
        risk_explanation,
    }
}

fn files_for_symbols(impacted: &[ImpactedSymbol], all_symbols: &[Symbol]) -> Vec<ImpactedFile> {
    let mut by_file: Vec<(Id, Vec<Id>)> = Vec::new();

    for impacted_symbol in impacted {
        let Some(symbol) = all_symbols
            .iter()
            .find(|s| s.id == impacted_symbol.symbol_id)
        else {
            continue;
        };
        match by_file.iter_mut().find(|(file_id, _)| *file_id == symbol.file_id) {
            Some((_, symbols)) => symbols.push(symbol.id.clone()),
            None => by_file.push((symbol.file_id.clone(), vec![symbol.id.clone()])),
        }
    }

    by_file
        .into_iter()
        .map(|(file_id, affected_symbol_ids)| ImpactedFile {
            file_id,
            affected_symbol_ids,
        })
        .collect()
}

/// Risk classification over `(impacted_files, impacted_symbols)` counts.
/// Checks are top-down; first match wins (spec §4.H).
fn classify_risk(file_count: usize, symbol_count: usize) -> (RiskLevel, String) {
    if (file_count == 0 && symbol_count == 0) || (file_count <= 2 && symbol_count <= 5) {
        return (
            RiskLevel::Low,
            format!("{file_count} file(s) and {symbol_count} symbol(s) impacted"),
        );
    }
    if file_count <= 5 && symbol_count <= 15 {
        return (
            RiskLevel::Medium,
            format!("{file_count} files and {symbol_count} symbols impacted"),
        );
    }
    if file_count <= 10 && symbol_count <= 30 {
        return (
            RiskLevel::High,
            format!("{file_count} files and {symbol_count} symbols impacted"),
        );
    }
    (
        RiskLevel::Critical,
        format!(
            "{file_count} files and {symbol_count} symbols impacted; exceeds high-risk thresholds"
        ),
    )
}

/// Convenience accessor mirroring spec §4.H's "file containing an impacted
/// symbol" query, exposed for callers that already have file records at
/// hand and don't want to thread `all_symbols` through again.
pub fn impacted_file_records<'a>(
    impacted_files: &[ImpactedFile],
    files: &'a [FileRecord],
) -> Vec<&'a FileRecord> {
    impacted_files
        .iter()
        .filter_map(|f| files.iter().find(|record| record.id == f.file_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_id, Reference, ReferenceKind, ReferenceTarget, SymbolKind};

    fn symbol(id: &Id, file_id: &Id) -> Symbol {
        Symbol {
            id: id.clone(),
            snapshot_id: new_id(),
            file_id: file_id.clone(),
            name: "x".to_string(),
            qualified_name: None,
            kind: SymbolKind::Function,
            start_line: 1,
            end_line: 1,
            start_col: 0,
            end_col: 0,
            signature: None,
            docstring: None,
            parent_id: None,
            span_approximate: false,
        }
    }

    fn reference(from: &Id, to: &Id) -> Reference {
        Reference {
            id: new_id(),
            snapshot_id: new_id(),
            from_symbol_id: from.clone(),
            target: ReferenceTarget::Symbol(to.clone()),
            kind: ReferenceKind::Call,
            line: 1,
            column: 0,
        }
    }

    #[test]
    fn no_incoming_references_yields_low_risk_empty_report() {
        let graph = ReferenceGraph::build(vec![]);
        let changed = vec![new_id()];
        let report = analyze_impact(&graph, &changed, &[]);
        assert!(report.impacted_symbols.is_empty());
        assert_eq!(report.risk_level, RiskLevel::Low);
    }

    #[test]
    fn direct_caller_is_marked_direct_at_distance_one() {
        let file = new_id();
        let changed_symbol = new_id();
        let caller = new_id();
        let symbols = vec![symbol(&changed_symbol, &file), symbol(&caller, &file)];
        let graph = ReferenceGraph::build(vec![reference(&caller, &changed_symbol)]);

        let report = analyze_impact(&graph, &[changed_symbol], &symbols);
        assert_eq!(report.impacted_symbols.len(), 1);
        assert_eq!(report.impacted_symbols[0].impact_type, ImpactType::Direct);
        assert_eq!(report.impacted_symbols[0].distance, 1);
    }

    #[test]
    fn transitive_caller_beyond_first_hop_is_marked_transitive() {
        let file = new_id();
        let changed_symbol = new_id();
        let direct_caller = new_id();
        let transitive_caller = new_id();
        let symbols = vec![
            symbol(&changed_symbol, &file),
            symbol(&direct_caller, &file),
            symbol(&transitive_caller, &file),
        ];
        let graph = ReferenceGraph::build(vec![
            reference(&direct_caller, &changed_symbol),
            reference(&transitive_caller, &direct_caller),
        ]);

        let report = analyze_impact(&graph, &[changed_symbol], &symbols);
        let transitive = report
            .impacted_symbols
            .iter()
            .find(|s| s.symbol_id == transitive_caller)
            .unwrap();
        assert_eq!(transitive.impact_type, ImpactType::Transitive);
        assert_eq!(transitive.distance, 2);
    }

    #[test]
    fn depth_beyond_cap_is_discarded() {
        let file = new_id();
        let ids: Vec<Id> = (0..6).map(|_| new_id()).collect();
        let symbols: Vec<Symbol> = ids.iter().map(|id| symbol(id, &file)).collect();
        // chain: ids[5] -> ids[4] -> ids[3] -> ids[2] -> ids[1] -> ids[0] (changed)
        let references: Vec<Reference> = (0..5).map(|i| reference(&ids[i + 1], &ids[i])).collect();
        let graph = ReferenceGraph::build(references);

        let report = analyze_impact(&graph, &[ids[0].clone()], &symbols);
        // Only 3 hops allowed: ids[1], ids[2], ids[3] should be impacted; ids[4], ids[5] discarded.
        assert_eq!(report.impacted_symbols.len(), 3);
        assert!(!report
            .impacted_symbols
            .iter()
            .any(|s| s.symbol_id == ids[4] || s.symbol_id == ids[5]));
    }

    #[test]
    fn risk_classification_thresholds() {
        assert_eq!(classify_risk(0, 0).0, RiskLevel::Low);
        assert_eq!(classify_risk(2, 5).0, RiskLevel::Low);
        assert_eq!(classify_risk(3, 10).0, RiskLevel::Medium);
        assert_eq!(classify_risk(5, 15).0, RiskLevel::Medium);
        assert_eq!(classify_risk(8, 20).0, RiskLevel::High);
        assert_eq!(classify_risk(10, 30).0, RiskLevel::High);
        assert_eq!(classify_risk(11, 31).0, RiskLevel::Critical);
        assert_eq!(classify_risk(2, 50).0, RiskLevel::Critical);
    }
}
