use crate::model::{RelationalModel, Table};
use serde::Serialize;
use std::fmt;

/// Where a table's rows end up in the document schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Root collection with the table's columns as-is
    Standalone,
    /// Root collection with foreign-key columns marked as links
    Reference,
    /// Nested under its only parent
    EmbedOneWay,
    /// Nested under both parents, each copy carrying the other parent's attributes
    EmbedTwoWay,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Placement::Standalone => "standalone",
            Placement::Reference => "reference",
            Placement::EmbedOneWay => "one-way embed",
            Placement::EmbedTwoWay => "two-way embed",
        };
        f.write_str(name)
    }
}

/// A guarded rule; `None` passes the table on to the next rule.
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&Table, &RelationalModel) -> Option<Placement>,
}

/// Placement rules in priority order. The last one always applies.
pub const RULES: &[Rule] = &[
    Rule {
        name: "no foreign keys",
        apply: no_foreign_keys,
    },
    Rule {
        name: "self-referencing",
        apply: self_referencing,
    },
    Rule {
        name: "at most two parents",
        apply: at_most_two_parents,
    },
    Rule {
        name: "many parents",
        apply: many_parents,
    },
];

/// Decide a table's placement; returns the placement and the rule that fired.
pub fn decide(table: &Table, model: &RelationalModel) -> (Placement, &'static str) {
    RULES
        .iter()
        .find_map(|rule| (rule.apply)(table, model).map(|placement| (placement, rule.name)))
        .unwrap_or((Placement::Reference, "fallback"))
}

fn no_foreign_keys(table: &Table, _: &RelationalModel) -> Option<Placement> {
    (table.fk_count() == 0).then_some(Placement::Standalone)
}

fn self_referencing(table: &Table, _: &RelationalModel) -> Option<Placement> {
    table.is_self_referencing().then_some(Placement::Reference)
}

fn at_most_two_parents(table: &Table, model: &RelationalModel) -> Option<Placement> {
    if table.fk_count() > 2 {
        return None;
    }
    if use_reference(table, model) {
        return Some(Placement::Reference);
    }

    Some(match table.foreign_keys.as_slice() {
        [_] => Placement::EmbedOneWay,
        [first, second] if first.referenced_table != second.referenced_table => {
            Placement::EmbedTwoWay
        }
        // two keys into the same parent cannot be told apart once nested
        _ => Placement::Reference,
    })
}

fn many_parents(_: &Table, _: &RelationalModel) -> Option<Placement> {
    Some(Placement::Reference)
}

/// Write-hot tables, and tables feeding a write-hot child, stay referenced.
pub fn use_reference(table: &Table, model: &RelationalModel) -> bool {
    let maf = model.maf();
    let hot = |t: &Table| t.uaf() as f64 > maf;

    hot(table)
        || table
            .referencing_tables
            .iter()
            .filter_map(|name| model.table(name))
            .any(hot)
}
