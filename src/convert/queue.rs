use crate::error::{MigrationError, Result, Stage};
use crate::model::{RelationalModel, Table};
use log::{debug, info};
use std::collections::HashSet;

/// Order tables so that each one follows every table it references.
///
/// Tables without foreign keys seed the queue; a fully cyclic schema is
/// seeded with its single-key self-referencing tables instead. Each dequeued
/// table admits the tables referencing it once all of their parents are
/// queued. Whatever is still stranded after that is swept up if its parents
/// made it in, and reported as an unresolved dependency otherwise.
pub fn dependency_order(model: &RelationalModel) -> Result<Vec<&Table>> {
    check_targets(model)?;

    let mut queue: Vec<&Table> = model.tables.iter().filter(|t| t.fk_count() == 0).collect();
    if queue.is_empty() {
        queue = model
            .tables
            .iter()
            .filter(|t| t.fk_count() == 1 && t.is_self_referencing())
            .collect();
        debug!(
            "no table without foreign keys; seeding with {} self-referencing tables",
            queue.len()
        );
    }
    let mut queued: HashSet<&str> = queue.iter().map(|t| t.name.as_str()).collect();

    let mut cursor = 0;
    loop {
        while let Some(&current) = queue.get(cursor) {
            cursor += 1;

            for name in &current.referencing_tables {
                let Some(referencing) = model.table(name) else {
                    continue;
                };
                if queued.contains(referencing.name.as_str()) {
                    continue;
                }
                if referencing.fk_count() == 1 || parents_queued(referencing, &queued) {
                    queued.insert(&referencing.name);
                    queue.push(referencing);
                }
            }
        }

        let stranded: Vec<&Table> = model
            .tables
            .iter()
            .filter(|t| !queued.contains(t.name.as_str()))
            .filter(|t| parents_queued(t, &queued))
            .collect();
        if stranded.is_empty() {
            break;
        }
        for table in stranded {
            debug!("re-admitting `{}`, all of its parents are queued", table.name);
            queued.insert(&table.name);
            queue.push(table);
        }
    }

    if queue.len() < model.tables.len() {
        let tables = model
            .tables
            .iter()
            .filter(|t| !queued.contains(t.name.as_str()))
            .map(|t| t.name.clone())
            .collect();
        return Err(MigrationError::UnresolvedDependency { tables });
    }

    info!("dependency order: {} tables", queue.len());
    Ok(queue)
}

fn parents_queued(table: &Table, queued: &HashSet<&str>) -> bool {
    table.foreign_keys.iter().all(|fk| {
        fk.referenced_table == table.name || queued.contains(fk.referenced_table.as_str())
    })
}

/// Every foreign key must point at a table of the model.
fn check_targets(model: &RelationalModel) -> Result<()> {
    for table in &model.tables {
        for fk in &table.foreign_keys {
            if model.table(&fk.referenced_table).is_none() {
                return Err(MigrationError::UnknownTable {
                    stage: Stage::Ordering,
                    table: fk.referenced_table.clone(),
                });
            }
        }
    }
    Ok(())
}
