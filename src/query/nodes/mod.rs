//! Concrete query node implementations
//!
//! This module provides implementations of the `QueryNode` trait for
//! various query types.

mod all_docs;
mod bool_query;
mod phrase_query;
mod prefix_query;
mod term_query;
mod wildcard_query;

pub use all_docs::AllDocsQuery;
pub use bool_query::BoolQuery;
pub use phrase_query::PhraseQuery;
pub use prefix_query::PrefixQuery;
pub use term_query::TermQuery;
pub use wildcard_query::WildcardQuery;

use std::collections::BTreeSet;

use crate::analysis::SymbolRole;
use crate::models::Field;
use crate::query::context::QueryContext;
use crate::segment::DocNo;
use crate::Result;

/// Lines of `docno` where `term` occurs in `field`
///
/// Symbol fields read the symbol table, `full` maps token positions through
/// the line table. Other fields have no line information.
pub(crate) fn term_lines(
    ctx: &QueryContext<'_>,
    field: Field,
    term: &str,
    docno: DocNo,
    lines: &mut BTreeSet<u32>,
) -> Result<()> {
    let role = match field {
        Field::Defs => SymbolRole::Definition,
        Field::Refs => SymbolRole::Reference,
        Field::Full => {
            if let (Some(posting), Some(doc)) =
                (ctx.posting(field, term, docno)?, ctx.document(docno))
            {
                lines.extend(posting.positions.iter().map(|&p| doc.line_of_position(p)));
            }
            return Ok(());
        }
        _ => return Ok(()),
    };

    lines.extend(
        ctx.symbols(docno)
            .iter()
            .filter(|s| s.role == role && s.name == term)
            .map(|s| s.line),
    );
    Ok(())
}

/// Score of the best-matching term of an expansion, zero when none match
pub(crate) fn best_expanded_score(
    ctx: &QueryContext<'_>,
    field: Field,
    terms: &[String],
    docno: DocNo,
) -> Result<f32> {
    for term in terms {
        if ctx.posting(field, term, docno)?.is_some() {
            return Ok(1.0);
        }
    }
    Ok(0.0)
}
