use roaring::RoaringBitmap;
use tessera_chunk::ChunkReaderContext;
use tessera_error::{TesseraResult, tessera_bail};

use crate::filter::{FilterExpr, Predicate, PredicateEvaluator};
use crate::index::{ForwardIndex, InvertedIndex, SortedIndexReader};
use crate::{ColumnIndexContainer, ImmutableSegment, MAX_DOC_PER_CALL};

/// Produces the ids of the documents of a segment that pass a filter.
#[derive(Debug)]
pub enum FilterOperator<'a> {
    /// Every document of the segment.
    MatchAll { num_docs: u32 },
    /// No document.
    Empty,
    /// Contiguous document ranges of the matching dictIds of a sorted column.
    Sorted {
        index: &'a SortedIndexReader,
        dict_ids: RoaringBitmap,
    },
    /// Union of the inverted index bitmaps of the matching dictIds.
    Bitmap {
        index: &'a InvertedIndex,
        dict_ids: RoaringBitmap,
    },
    /// Batched evaluation against the forward index.
    Scan {
        container: &'a ColumnIndexContainer,
        evaluator: PredicateEvaluator,
        num_docs: u32,
    },
    And(Vec<FilterOperator<'a>>),
    Or(Vec<FilterOperator<'a>>),
}

impl<'a> FilterOperator<'a> {
    /// Choose the cheapest operator for `filter`: sorted index, then inverted index, then scan.
    pub fn plan(segment: &'a ImmutableSegment, filter: Option<&FilterExpr>) -> TesseraResult<Self> {
        let num_docs = u32::try_from(segment.num_docs())?;
        let operator = match filter {
            None => Self::MatchAll { num_docs },
            Some(expr) => Self::plan_expr(segment, expr, num_docs)?,
        };
        log::debug!("planned {} filter over segment {}", operator.name(), segment.name());
        Ok(operator)
    }

    fn plan_expr(segment: &'a ImmutableSegment, expr: &FilterExpr, num_docs: u32) -> TesseraResult<Self> {
        match expr {
            FilterExpr::Predicate(predicate) => Self::plan_predicate(segment, predicate, num_docs),
            FilterExpr::And(children) => {
                let mut operators = Vec::with_capacity(children.len());
                for child in children {
                    match Self::plan_expr(segment, child, num_docs)? {
                        Self::Empty => return Ok(Self::Empty),
                        Self::MatchAll { .. } => {}
                        operator => operators.push(operator),
                    }
                }
                Ok(match operators.len() {
                    0 => Self::MatchAll { num_docs },
                    1 => operators.swap_remove(0),
                    _ => Self::And(operators),
                })
            }
            FilterExpr::Or(children) => {
                let mut operators = Vec::with_capacity(children.len());
                for child in children {
                    match Self::plan_expr(segment, child, num_docs)? {
                        Self::Empty => {}
                        all @ Self::MatchAll { .. } => return Ok(all),
                        operator => operators.push(operator),
                    }
                }
                Ok(match operators.len() {
                    0 => Self::Empty,
                    1 => operators.swap_remove(0),
                    _ => Self::Or(operators),
                })
            }
        }
    }

    fn plan_predicate(segment: &'a ImmutableSegment, predicate: &Predicate, num_docs: u32) -> TesseraResult<Self> {
        let container = segment.column(&predicate.column)?;
        let evaluator = PredicateEvaluator::try_new(predicate, container)
            .map_err(|e| e.with_context(format!("evaluating predicate {predicate}")))?;
        if evaluator.is_always_false() {
            return Ok(Self::Empty);
        }
        if evaluator.is_always_true() {
            return Ok(Self::MatchAll { num_docs });
        }
        Ok(match (container.inverted_index(), evaluator.matching_dict_ids()) {
            (Some(InvertedIndex::Sorted(index)), Some(dict_ids)) => Self::Sorted {
                index,
                dict_ids: dict_ids.clone(),
            },
            (Some(index), Some(dict_ids)) if matches!(index, InvertedIndex::Bitmap(_)) => Self::Bitmap {
                index,
                dict_ids: dict_ids.clone(),
            },
            _ => Self::Scan {
                container,
                evaluator,
                num_docs,
            },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MatchAll { .. } => "match-all",
            Self::Empty => "empty",
            Self::Sorted { .. } => "sorted",
            Self::Bitmap { .. } => "bitmap",
            Self::Scan { .. } => "scan",
            Self::And(_) => "and",
            Self::Or(_) => "or",
        }
    }

    /// The matching document ids.
    pub fn doc_ids(&self) -> TesseraResult<RoaringBitmap> {
        match self {
            Self::MatchAll { num_docs } => {
                let mut docs = RoaringBitmap::new();
                docs.insert_range(0..*num_docs);
                Ok(docs)
            }
            Self::Empty => Ok(RoaringBitmap::new()),
            Self::Sorted { index, dict_ids } => {
                let mut docs = RoaringBitmap::new();
                for id in dict_ids {
                    docs.insert_range(index.doc_range(id)?);
                }
                Ok(docs)
            }
            Self::Bitmap { index, dict_ids } => {
                let mut docs = RoaringBitmap::new();
                for id in dict_ids {
                    docs |= index.doc_ids(id)?;
                }
                Ok(docs)
            }
            Self::Scan {
                container,
                evaluator,
                num_docs,
            } => scan(container, evaluator, *num_docs),
            Self::And(children) => {
                let mut iter = children.iter();
                let Some(first) = iter.next() else {
                    return Ok(RoaringBitmap::new());
                };
                let mut docs = first.doc_ids()?;
                for child in iter {
                    if docs.is_empty() {
                        break;
                    }
                    docs &= child.doc_ids()?;
                }
                Ok(docs)
            }
            Self::Or(children) => {
                let mut docs = RoaringBitmap::new();
                for child in children {
                    docs |= child.doc_ids()?;
                }
                Ok(docs)
            }
        }
    }
}

fn scan(container: &ColumnIndexContainer, evaluator: &PredicateEvaluator, num_docs: u32) -> TesseraResult<RoaringBitmap> {
    let mut docs = RoaringBitmap::new();
    let forward = container.forward_index();
    match forward {
        ForwardIndex::Sorted(_) | ForwardIndex::FixedBitSingle(_) => {
            let mut doc_ids = Vec::with_capacity(MAX_DOC_PER_CALL);
            let mut dict_ids = vec![0u32; MAX_DOC_PER_CALL];
            let mut start = 0u32;
            while start < num_docs {
                let end = start.saturating_add(MAX_DOC_PER_CALL as u32).min(num_docs);
                doc_ids.clear();
                doc_ids.extend(start..end);
                forward.read_dict_ids(&doc_ids, &mut dict_ids)?;
                docs.extend(
                    doc_ids
                        .iter()
                        .zip(&dict_ids)
                        .filter(|(_, id)| evaluator.apply_dict_id(**id))
                        .map(|(doc, _)| *doc),
                );
                start = end;
            }
        }
        ForwardIndex::FixedBitMulti(reader) => {
            let mut dict_ids = vec![0u32; container.metadata().max_number_of_multi_values];
            for doc in 0..num_docs {
                let n = reader.read_dict_ids(doc, &mut dict_ids)?;
                if dict_ids[..n].iter().any(|id| evaluator.apply_dict_id(*id)) {
                    docs.insert(doc);
                }
            }
        }
        ForwardIndex::Raw(reader) => {
            if evaluator.is_dictionary_based() {
                tessera_bail!(InvalidState: "dictionary predicate over raw column {}", container.name());
            }
            let mut ctx = ChunkReaderContext::new();
            for doc in 0..num_docs {
                if evaluator.apply_value(&reader.get(doc, &mut ctx)?) {
                    docs.insert(doc);
                }
            }
        }
    }
    Ok(docs)
}

#[cfg(test)]
mod test {
    use std::ops::Bound;

    use roaring::RoaringBitmap;
    use rstest::rstest;
    use tessera_dtype::Value;

    use crate::IndexLoadingConfig;
    use crate::filter::{FilterExpr, FilterOperator, Predicate};
    use crate::test_harness::{ROWS, config, employee_segment};

    fn row_values(doc: usize, column: &str) -> Vec<Value> {
        let (name, country, language, salary, bonus, tags) = ROWS[doc];
        match column {
            "name" => vec![name.into()],
            "country" => vec![country.into()],
            "language" => vec![language.into()],
            "salary" => vec![salary.into()],
            "bonus" => vec![bonus.into()],
            "tags" => tags.iter().map(|t| Value::from(*t)).collect(),
            _ => unreachable!(),
        }
    }

    fn brute_force(expr: &FilterExpr) -> RoaringBitmap {
        (0..ROWS.len())
            .filter(|doc| matches_row(expr, *doc))
            .map(|doc| doc as u32)
            .collect()
    }

    fn matches_row(expr: &FilterExpr, doc: usize) -> bool {
        match expr {
            FilterExpr::Predicate(p) => row_values(doc, &p.column).iter().any(|v| p.op.matches(v)),
            FilterExpr::And(children) => children.iter().all(|c| matches_row(c, doc)),
            FilterExpr::Or(children) => children.iter().any(|c| matches_row(c, doc)),
        }
    }

    #[rstest]
    #[case(Predicate::equals("country", "CH").into(), "bitmap")]
    #[case(Predicate::equals("name", "Zackie").into(), "sorted")]
    #[case(Predicate::not_in("name", ["Rahul"]).into(), "sorted")]
    #[case(Predicate::range("salary", Bound::Included(2), Bound::Included(5)).into(), "scan")]
    #[case(Predicate::range("bonus", Bound::Excluded(3.0), Bound::Unbounded).into(), "scan")]
    #[case(Predicate::equals("bonus", 1.5).into(), "scan")]
    #[case(Predicate::equals("tags", 1).into(), "bitmap")]
    #[case(Predicate::not_in("tags", [1, 2]).into(), "bitmap")]
    #[case(Predicate::in_values("language", ["Hin", "Tamil"]).into(), "scan")]
    #[case(Predicate::range("salary", Bound::Excluded(2.5), Bound::Excluded(8.0)).into(), "scan")]
    #[case(Predicate::not_equals("country", "XX").into(), "match-all")]
    #[case(Predicate::equals("country", "XX").into(), "empty")]
    #[case(Predicate::equals("salary", "3").into(), "empty")]
    #[case(FilterExpr::and([Predicate::equals("country", "CH").into(), Predicate::range("salary", Bound::Included(8), Bound::Unbounded).into()]), "and")]
    #[case(FilterExpr::or([Predicate::equals("country", "US").into(), Predicate::equals("name", "Rahul").into()]), "or")]
    #[case(FilterExpr::and([Predicate::equals("country", "XX").into(), Predicate::equals("name", "Rahul").into()]), "empty")]
    #[case(FilterExpr::or([Predicate::not_equals("country", "XX").into(), Predicate::equals("name", "Rahul").into()]), "match-all")]
    fn agrees_with_brute_force(#[case] expr: FilterExpr, #[case] operator: &str) {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let plan = FilterOperator::plan(&segment, Some(&expr)).unwrap();
        assert_eq!(plan.name(), operator);
        assert_eq!(plan.doc_ids().unwrap(), brute_force(&expr));
    }

    #[test]
    fn scan_without_inverted_index() {
        let dir = tempfile::tempdir().unwrap();
        let loading = IndexLoadingConfig::default().with_inverted_index_columns(vec![]);
        let segment = employee_segment(dir.path(), config(), &loading);
        for expr in [
            FilterExpr::from(Predicate::equals("country", "CH")),
            FilterExpr::from(Predicate::in_values("tags", [3, 4])),
        ] {
            let plan = FilterOperator::plan(&segment, Some(&expr)).unwrap();
            assert_eq!(plan.name(), "scan");
            assert_eq!(plan.doc_ids().unwrap(), brute_force(&expr));
        }
    }

    #[test]
    fn no_filter_matches_all() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let docs = FilterOperator::plan(&segment, None).unwrap().doc_ids().unwrap();
        assert_eq!(docs.len(), ROWS.len() as u64);
    }

    #[test]
    fn unknown_column_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let expr = FilterExpr::from(Predicate::equals("age", 3));
        assert!(FilterOperator::plan(&segment, Some(&expr)).is_err());
    }
}
