use crate::convert::placement::{decide, Placement};
use crate::error::{MigrationError, Result, Stage};
use crate::model::{Collection, ForeignKey, NoSqlModel, RelationalModel, Table};
use log::{debug, info};

/// Builds the document schema from dependency-ordered tables.
///
/// Every table must arrive after the tables it references, so the
/// collection it embeds into already exists.
pub struct SchemaTransformer<'a> {
    model: &'a RelationalModel,
    reference_suffix: String,
}

impl<'a> SchemaTransformer<'a> {
    pub fn new(model: &'a RelationalModel) -> Self {
        SchemaTransformer {
            model,
            reference_suffix: "_REF".to_string(),
        }
    }

    pub fn with_reference_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.reference_suffix = suffix.into();
        self
    }

    pub fn transform(&self, order: &[&Table]) -> Result<NoSqlModel> {
        let mut schema = NoSqlModel::new(self.model.name.clone());

        for table in order {
            let (placement, rule) = decide(table, self.model);
            debug!("`{}`: {} ({})", table.name, placement, rule);

            match placement {
                Placement::Standalone => {
                    schema.add_collection(Collection::new(&table.name, &table.columns))
                }
                Placement::Reference => schema.add_collection(self.reference(table)),
                Placement::EmbedOneWay => self.embed_one_way(&mut schema, table)?,
                Placement::EmbedTwoWay => self.embed_two_way(&mut schema, table)?,
            }
        }

        info!(
            "document schema: {} root collections, {} in total",
            schema.collections.len(),
            schema.collection_count()
        );
        Ok(schema)
    }

    /// Root collection whose foreign-key columns carry the reference suffix.
    fn reference(&self, table: &Table) -> Collection {
        let attributes = table.columns.iter().map(|column| {
            if table.is_fk_column(column) {
                format!("{}{}", column, self.reference_suffix)
            } else {
                column.clone()
            }
        });
        Collection::new(&table.name, attributes)
    }

    fn embed_one_way(&self, schema: &mut NoSqlModel, table: &Table) -> Result<()> {
        let Some(fk) = table.foreign_keys.first() else {
            schema.add_collection(Collection::new(&table.name, &table.columns));
            return Ok(());
        };

        let attributes = table.columns.iter().filter(|c| **c != fk.column_name);
        let collection = Collection::new(&table.name, attributes);
        self.attach(schema, &fk.referenced_table, collection)
    }

    fn embed_two_way(&self, schema: &mut NoSqlModel, table: &Table) -> Result<()> {
        let [first, second] = table.foreign_keys.as_slice() else {
            schema.add_collection(self.reference(table));
            return Ok(());
        };

        let for_first = self.merged_copy(table, second)?;
        let for_second = self.merged_copy(table, first)?;
        self.attach(schema, &first.referenced_table, for_first)?;
        self.attach(schema, &second.referenced_table, for_second)
    }

    /// Copy of `table` carrying the attributes of the parent behind `other`.
    fn merged_copy(&self, table: &Table, other: &ForeignKey) -> Result<Collection> {
        let parent = self.lookup(&other.referenced_table)?;

        let own = table.columns.iter().filter(|c| !table.is_fk_column(c));
        let mut collection = Collection::new(&table.name, own);
        for column in &parent.columns {
            if !parent.primary_keys.contains(column) {
                collection.add_attribute(column);
            }
        }
        Ok(collection.with_embedded_attributes_from(&parent.name))
    }

    fn attach(&self, schema: &mut NoSqlModel, parent: &str, collection: Collection) -> Result<()> {
        let target = schema
            .find_mut(parent)
            .ok_or_else(|| MigrationError::MissingCollection {
                stage: Stage::Transform,
                collection: parent.to_string(),
            })?;
        target.add_embedded_collection(collection);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&'a Table> {
        self.model
            .table(name)
            .ok_or_else(|| MigrationError::UnknownTable {
                stage: Stage::Transform,
                table: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Engine;
    use crate::convert::queue::dependency_order;

    fn school() -> RelationalModel {
        RelationalModel::new(Engine::MySql, "school", school_tables())
    }

    fn school_tables() -> Vec<Table> {
        let mut students = Table::new("students", 2)
            .with_columns(["id", "name"])
            .with_primary_keys(["id"]);
        students.add_referencing_table("enrollments");
        let mut courses = Table::new("courses", 2)
            .with_columns(["id", "title"])
            .with_primary_keys(["id"]);
        courses.add_referencing_table("enrollments");
        let enrollments = Table::new("enrollments", 3)
            .with_columns(["id", "student_id", "course_id", "grade"])
            .with_primary_keys(["id"])
            .with_foreign_key(ForeignKey::new("student_id", "students", "id"))
            .with_foreign_key(ForeignKey::new("course_id", "courses", "id"));
        vec![students, courses, enrollments]
    }

    fn transform(model: &RelationalModel) -> NoSqlModel {
        let order = dependency_order(model).unwrap();
        SchemaTransformer::new(model).transform(&order).unwrap()
    }

    #[test]
    fn test_two_way_embedding() {
        let model = school();
        let schema = transform(&model);

        let roots: Vec<_> = schema.collections.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(roots, vec!["students", "courses"]);

        let under_students = &schema.collections[0].embedded_collections[0];
        assert_eq!(under_students.name, "enrollments");
        assert_eq!(under_students.attributes, vec!["id", "grade", "title"]);
        assert_eq!(under_students.embedded_attributes_from.as_deref(), Some("courses"));

        let under_courses = &schema.collections[1].embedded_collections[0];
        assert_eq!(under_courses.attributes, vec!["id", "grade", "name"]);
        assert_eq!(under_courses.embedded_attributes_from.as_deref(), Some("students"));
    }

    fn walk<'c>(collection: &'c Collection, depth: usize, out: &mut Vec<(&'c Collection, usize)>) {
        out.push((collection, depth));
        for child in &collection.embedded_collections {
            walk(child, depth + 1, out);
        }
    }

    #[test]
    fn test_every_nested_collection_comes_from_an_embedded_table() {
        let mut tables = Vec::new();
        let mut users = Table::new("users", 2).with_columns(["id", "name"]).with_primary_keys(["id"]);
        users.add_referencing_table("orders");
        users.add_referencing_table("audit");
        tables.push(users);
        tables.push(
            Table::new("orders", 3)
                .with_columns(["id", "user_id", "total"])
                .with_primary_keys(["id"])
                .with_foreign_key(ForeignKey::new("user_id", "users", "id")),
        );
        for (name, column) in [("students", "name"), ("courses", "title")] {
            let mut parent = Table::new(name, 2)
                .with_columns(["id", column])
                .with_primary_keys(["id"]);
            parent.add_referencing_table("enrollments");
            parent.add_referencing_table("audit");
            tables.push(parent);
        }
        tables.push(
            Table::new("enrollments", 4)
                .with_columns(["student_id", "course_id"])
                .with_primary_keys(["student_id", "course_id"])
                .with_foreign_key(ForeignKey::new("student_id", "students", "id"))
                .with_foreign_key(ForeignKey::new("course_id", "courses", "id")),
        );
        tables.push(
            Table::new("audit", 5)
                .with_columns(["id", "user_id", "student_id", "course_id"])
                .with_foreign_key(ForeignKey::new("user_id", "users", "id"))
                .with_foreign_key(ForeignKey::new("student_id", "students", "id"))
                .with_foreign_key(ForeignKey::new("course_id", "courses", "id")),
        );
        let model = RelationalModel::new(Engine::MySql, "mixed", tables);
        let schema = transform(&model);

        let mut seen = Vec::new();
        for root in &schema.collections {
            walk(root, 0, &mut seen);
        }

        let placements: Vec<_> = seen
            .iter()
            .map(|(c, _)| decide(model.table(&c.name).unwrap(), &model).0)
            .collect();
        for placement in [
            Placement::Standalone,
            Placement::Reference,
            Placement::EmbedOneWay,
            Placement::EmbedTwoWay,
        ] {
            assert!(placements.contains(&placement), "no {} collection", placement);
        }

        for ((collection, depth), placement) in seen.iter().zip(&placements) {
            let table = model.table(&collection.name).unwrap();
            if *depth == 0 {
                assert!(matches!(placement, Placement::Standalone | Placement::Reference));
                continue;
            }
            assert!(table.fk_count() >= 1, "`{}` nested without a parent", collection.name);
            assert!(matches!(placement, Placement::EmbedOneWay | Placement::EmbedTwoWay));
            if let Some(source) = collection.embedded_attributes_from.as_deref() {
                assert_eq!(*placement, Placement::EmbedTwoWay);
                assert!(table.fk_to(source).is_some());
            }
        }

        let enrollments: Vec<_> = seen
            .iter()
            .filter(|(c, _)| c.name == "enrollments")
            .map(|(c, _)| c.attributes.clone())
            .collect();
        assert_eq!(enrollments, vec![vec!["title".to_string()], vec!["name".to_string()]]);
    }

    #[test]
    fn test_reference_marks_only_foreign_keys() {
        let mut users = Table::new("users", 1).with_columns(["id", "name"]);
        users.add_referencing_table("orders");
        let orders = Table::new("orders", 1)
            .with_columns(["id", "user_id", "total"])
            .with_foreign_key(ForeignKey::new("user_id", "users", "id"));
        let mut model = RelationalModel::new(Engine::MySql, "shop", vec![users, orders]);

        let orders = model.resolve_mut("orders").unwrap();
        orders.add_general_access();
        orders.add_update_access();
        model.compute_maf(0.0125);

        let schema = transform(&model);
        assert_eq!(schema.collections.len(), 2);
        assert!(schema.collections[0].embedded_collections.is_empty());

        let orders = schema.find("orders").unwrap();
        assert_eq!(orders.attributes, vec!["id", "user_id_REF", "total"]);
        let marked: Vec<_> = schema
            .collections
            .iter()
            .flat_map(|c| c.attributes.iter())
            .filter(|a| a.ends_with("_REF"))
            .collect();
        assert_eq!(marked, vec!["user_id_REF"]);
    }

    #[test]
    fn test_one_way_nesting_follows_parent_copy() {
        let mut tables = school_tables();
        tables[2].add_referencing_table("grade_notes");
        tables.push(
            Table::new("grade_notes", 1)
                .with_columns(["note", "enrollment_id"])
                .with_foreign_key(ForeignKey::new("enrollment_id", "enrollments", "id")),
        );
        let model = RelationalModel::new(Engine::MySql, "school", tables);

        let schema = transform(&model);
        let enrollments = schema.find("enrollments").unwrap();
        assert_eq!(enrollments.embedded_attributes_from.as_deref(), Some("courses"));
        assert_eq!(enrollments.embedded_collections[0].name, "grade_notes");
        assert_eq!(enrollments.embedded_collections[0].attributes, vec!["note"]);
    }

    #[test]
    fn test_self_referencing_table_keeps_marked_key() {
        let mut categories = Table::new("categories", 1)
            .with_columns(["id", "parent_id"])
            .with_foreign_key(ForeignKey::new("parent_id", "categories", "id"));
        categories.add_referencing_table("categories");
        let model = RelationalModel::new(Engine::PostgreSql, "cms", vec![categories]);

        let schema = SchemaTransformer::new(&model)
            .with_reference_suffix("_ref")
            .transform(&dependency_order(&model).unwrap())
            .unwrap();
        assert_eq!(schema.collections[0].attributes, vec!["id", "parent_id_ref"]);
    }

    #[test]
    fn test_missing_parent_collection() {
        let model = school();
        let enrollments = model.table("enrollments").unwrap();
        let err = SchemaTransformer::new(&model)
            .transform(&[enrollments])
            .unwrap_err();
        assert!(matches!(err, MigrationError::MissingCollection { stage: Stage::Transform, .. }));
    }
}
