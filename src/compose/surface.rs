//! The composition surface and its full-resync projection.

use std::collections::BTreeMap;

use serde_json::Value;

use super::pill::{Pill, PillEdit, PillId, PillKind, Slot};
use super::{CompositionError, CompositionResult};
use crate::catalog::{FieldType, SchemaCatalog, SchemaField};
use crate::query::{
    parse_formula, Aggregation, CalculatedField, ColumnSpec, FieldRef, FilterOperator, FilterSpec,
    FormatSpec, Granularity, GroupSpec, Join, JoinType, Pagination, QueryDefinition,
    SortDirection, SortSpec,
};

/// Mutable pills per slot.
///
/// The surface is a projection: the coordinator rebuilds the canonical
/// [`QueryDefinition`] from it with [`resync`](Self::resync) after every edit.
#[derive(Debug, Clone, Default)]
pub struct CompositionSurface {
    pills: Vec<Pill>,
    formats: BTreeMap<String, FormatSpec>,
    next_id: u64,
}

impl CompositionSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pills(&self) -> &[Pill] {
        &self.pills
    }

    pub fn pills_in(&self, slot: Slot) -> impl Iterator<Item = &Pill> {
        self.pills.iter().filter(move |p| p.slot == slot)
    }

    pub fn pill(&self, id: PillId) -> Option<&Pill> {
        self.pills.iter().find(|p| p.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.pills.is_empty()
    }

    pub fn clear(&mut self) {
        self.pills.clear();
        self.formats.clear();
    }

    fn push(&mut self, slot: Slot, kind: PillKind) -> PillId {
        self.next_id += 1;
        let id = PillId(self.next_id);
        self.pills.push(Pill { id, slot, kind });
        id
    }

    /// Drop a schema field into a slot.
    pub fn drop_field(&mut self, slot: Slot, field: &SchemaField) -> CompositionResult<PillId> {
        let kind = field_pill(slot, field.field_ref(), field.field_type, field.is_numeric)?;
        Ok(self.push(slot, kind))
    }

    /// Drop a calculated field into a slot.
    pub fn drop_calculated(&mut self, slot: Slot, name: &str) -> CompositionResult<PillId> {
        if !self.has_calculated(name) {
            return Err(CompositionError::UnknownCalculatedField(name.to_string()));
        }
        let kind = field_pill(slot, FieldRef::calculated(name), FieldType::Float, true)?;
        Ok(self.push(slot, kind))
    }

    /// Define a calculated field.
    pub fn add_calculated(&mut self, name: &str, formula: &str) -> CompositionResult<PillId> {
        let name = name.trim();
        if name.is_empty() || name.contains('.') {
            return Err(CompositionError::InvalidCalculatedName(name.to_string()));
        }
        if self.has_calculated(name) {
            return Err(CompositionError::DuplicateCalculatedField(name.to_string()));
        }
        parse_formula(formula).map_err(|error| CompositionError::InvalidFormula {
            name: name.to_string(),
            error,
        })?;
        let id = self.push(
            Slot::Calculated,
            PillKind::Calculated {
                name: name.to_string(),
                formula: formula.to_string(),
            },
        );
        if let Err(e) = self.check_not_circular(name) {
            self.pills.retain(|p| p.id != id);
            return Err(e);
        }
        Ok(id)
    }

    /// Add a hand-built join pill. Each provided side must be a field the
    /// surface already references.
    pub fn add_join(
        &mut self,
        left: Option<FieldRef>,
        join_type: JoinType,
        right: Option<FieldRef>,
    ) -> CompositionResult<PillId> {
        for side in left.iter().chain(right.iter()) {
            self.check_join_side(side)?;
        }
        Ok(self.push(
            Slot::Joins,
            PillKind::Join {
                left,
                join_type,
                right,
            },
        ))
    }

    /// Add a join taken from relationship suggestions. Its sides are key
    /// fields of referenced tables and are not checked against the
    /// referenced fields.
    pub fn add_suggested_join(&mut self, join: Join) -> PillId {
        self.push(
            Slot::Joins,
            PillKind::Join {
                left: Some(join.left),
                join_type: join.join_type,
                right: Some(join.right),
            },
        )
    }

    /// Apply an in-pill edit.
    pub fn edit(&mut self, id: PillId, edit: PillEdit) -> CompositionResult<()> {
        if let PillEdit::JoinLeft(field) | PillEdit::JoinRight(field) = &edit {
            self.check_join_side(field)?;
        }
        let idx = self.index_of(id)?;

        let previous = self.pills[idx].kind.clone();
        let slot = self.pills[idx].slot;
        apply_edit(slot, &mut self.pills[idx].kind, edit)?;

        if let PillKind::Calculated { name, .. } = &self.pills[idx].kind {
            let name = name.clone();
            if let Err(e) = self.check_not_circular(&name) {
                self.pills[idx].kind = previous;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove a pill. A calculated field still placed in another slot cannot
    /// be removed. Join pills left pointing at tables nothing references any
    /// more are removed with it.
    pub fn remove(&mut self, id: PillId) -> CompositionResult<Pill> {
        let idx = self.index_of(id)?;
        if let PillKind::Calculated { name, .. } = &self.pills[idx].kind {
            let calc = FieldRef::calculated(name.as_str());
            if self.pills.iter().any(|p| p.kind.field() == Some(&calc)) {
                return Err(CompositionError::CalculatedFieldInUse(name.clone()));
            }
        }
        let removed = self.pills.remove(idx);
        if removed.slot != Slot::Joins {
            self.prune_dangling_joins();
        }
        Ok(removed)
    }

    fn prune_dangling_joins(&mut self) {
        let tables = self.resync(None, Pagination::default()).referenced_tables();
        let before = self.pills.len();
        self.pills.retain(|p| match &p.kind {
            PillKind::Join { left, right, .. } => left
                .iter()
                .chain(right.iter())
                .all(|side| tables.contains(&side.table)),
            _ => true,
        });
        if self.pills.len() < before {
            tracing::debug!(removed = before - self.pills.len(), "pruned joins on unreferenced tables");
        }
    }

    /// Replace every filter pill with the given filters.
    ///
    /// Types are looked up in the catalog; unknown fields keep `Other`.
    pub fn replace_filters(&mut self, filters: &[FilterSpec], catalog: &SchemaCatalog) {
        self.pills.retain(|p| p.slot != Slot::Filters);
        for filter in filters {
            let field_type = field_type_of(&filter.field, catalog);
            self.push(
                Slot::Filters,
                PillKind::Filter {
                    field: filter.field.clone(),
                    field_type,
                    operator: filter.operator,
                    value: filter.value.clone(),
                    granularity: filter.granularity,
                },
            );
        }
    }

    /// Set or clear the read-time format for a result header.
    pub fn set_format(&mut self, header: impl Into<String>, format: Option<FormatSpec>) {
        let header = header.into();
        match format {
            Some(format) => {
                self.formats.insert(header, format);
            }
            None => {
                self.formats.remove(&header);
            }
        }
    }

    /// Re-read every pill of every slot into a fresh definition.
    pub fn resync(&self, connection_id: Option<&str>, pagination: Pagination) -> QueryDefinition {
        let mut def = QueryDefinition {
            connection_id: connection_id.map(str::to_string),
            formats: self.formats.clone(),
            pagination,
            ..QueryDefinition::default()
        };

        for pill in &self.pills {
            match &pill.kind {
                PillKind::Column {
                    field,
                    aggregation,
                    label,
                    ..
                } => def.columns.push(ColumnSpec {
                    field: field.clone(),
                    aggregation: *aggregation,
                    label: label.clone(),
                }),
                PillKind::Filter {
                    field,
                    operator,
                    value,
                    granularity,
                    ..
                } => def.filters.push(FilterSpec {
                    field: field.clone(),
                    operator: *operator,
                    value: value.clone(),
                    granularity: *granularity,
                }),
                PillKind::Group {
                    field, granularity, ..
                } => def.groups.push(GroupSpec {
                    field: field.clone(),
                    granularity: *granularity,
                }),
                PillKind::Sort { field, direction } => def.sorts.push(SortSpec {
                    field: field.clone(),
                    direction: *direction,
                }),
                PillKind::Join {
                    left: Some(left),
                    join_type,
                    right: Some(right),
                } => def.joins.push(Join {
                    left: left.clone(),
                    join_type: *join_type,
                    right: right.clone(),
                }),
                PillKind::Join { .. } => {}
                PillKind::Calculated { name, formula } => def
                    .calculated_fields
                    .push(CalculatedField::new(name.clone(), formula.clone())),
            }
        }
        def
    }

    /// Rebuild the surface from a stored definition.
    pub fn load_definition(&mut self, def: &QueryDefinition, catalog: &SchemaCatalog) {
        self.clear();
        for calc in &def.calculated_fields {
            self.push(
                Slot::Calculated,
                PillKind::Calculated {
                    name: calc.name.clone(),
                    formula: calc.formula.clone(),
                },
            );
        }
        for column in &def.columns {
            let numeric = column.field.is_calculated() || catalog.is_numeric(&column.field);
            self.push(
                Slot::Columns,
                PillKind::Column {
                    field: column.field.clone(),
                    numeric,
                    aggregation: column.aggregation,
                    label: column.label.clone(),
                },
            );
        }
        self.replace_filters(&def.filters, catalog);
        for group in &def.groups {
            self.push(
                Slot::Groups,
                PillKind::Group {
                    field: group.field.clone(),
                    field_type: field_type_of(&group.field, catalog),
                    granularity: group.granularity,
                },
            );
        }
        for sort in &def.sorts {
            self.push(
                Slot::Sorts,
                PillKind::Sort {
                    field: sort.field.clone(),
                    direction: sort.direction,
                },
            );
        }
        for join in &def.joins {
            self.push(
                Slot::Joins,
                PillKind::Join {
                    left: Some(join.left.clone()),
                    join_type: join.join_type,
                    right: Some(join.right.clone()),
                },
            );
        }
        self.formats = def.formats.clone();
    }

    /// Fields placed on the surface outside the join slot, in pill order.
    pub fn referenced_fields(&self) -> Vec<FieldRef> {
        self.resync(None, Pagination::default()).referenced_fields()
    }

    fn has_calculated(&self, name: &str) -> bool {
        self.pills
            .iter()
            .any(|p| matches!(&p.kind, PillKind::Calculated { name: n, .. } if n == name))
    }

    fn index_of(&self, id: PillId) -> CompositionResult<usize> {
        self.pills
            .iter()
            .position(|p| p.id == id)
            .ok_or(CompositionError::UnknownPill(id))
    }

    fn check_join_side(&self, field: &FieldRef) -> CompositionResult<()> {
        let candidates = self.resync(None, Pagination::default()).join_candidate_fields();
        if !candidates.contains(field) {
            return Err(CompositionError::JoinFieldNotReferenced(field.clone()));
        }
        Ok(())
    }

    fn check_not_circular(&self, name: &str) -> CompositionResult<()> {
        if self.resync(None, Pagination::default()).is_circular(name) {
            return Err(CompositionError::CircularFormula(name.to_string()));
        }
        Ok(())
    }
}

fn field_type_of(field: &FieldRef, catalog: &SchemaCatalog) -> FieldType {
    if field.is_calculated() {
        return FieldType::Float;
    }
    catalog
        .field(field)
        .map(|f| f.field_type)
        .unwrap_or(FieldType::Other)
}

fn field_pill(slot: Slot, field: FieldRef, field_type: FieldType, numeric: bool) -> CompositionResult<PillKind> {
    match slot {
        Slot::Columns => Ok(PillKind::Column {
            field,
            numeric,
            aggregation: Aggregation::None,
            label: None,
        }),
        Slot::Filters => Ok(PillKind::Filter {
            field,
            field_type,
            operator: FilterOperator::Equals,
            value: Value::Null,
            granularity: Granularity::Exact,
        }),
        Slot::Groups => Ok(PillKind::Group {
            field,
            field_type,
            granularity: Granularity::Exact,
        }),
        Slot::Sorts => Ok(PillKind::Sort {
            field,
            direction: SortDirection::Asc,
        }),
        Slot::Joins | Slot::Calculated => Err(CompositionError::SlotNotAccepting(slot)),
    }
}

fn apply_edit(slot: Slot, kind: &mut PillKind, edit: PillEdit) -> CompositionResult<()> {
    match (kind, edit) {
        (
            PillKind::Column {
                field,
                numeric,
                aggregation,
                ..
            },
            PillEdit::Aggregation(requested),
        ) => {
            if !requested.is_allowed_for(*numeric) {
                return Err(CompositionError::AggregationNotAllowed {
                    field: field.clone(),
                    aggregation: requested,
                });
            }
            *aggregation = requested;
        }
        (PillKind::Column { label, .. }, PillEdit::Label(new_label)) => {
            *label = new_label.filter(|l| !l.trim().is_empty());
        }
        (PillKind::Filter { operator, .. }, PillEdit::Operator(op)) => *operator = op,
        (PillKind::Filter { value, .. }, PillEdit::Value(v)) => *value = v,
        (
            PillKind::Filter {
                field,
                field_type,
                granularity,
                ..
            }
            | PillKind::Group {
                field,
                field_type,
                granularity,
            },
            PillEdit::Granularity(requested),
        ) => {
            if !requested.is_allowed_for(*field_type) {
                return Err(CompositionError::GranularityNotAllowed {
                    field: field.clone(),
                    granularity: requested,
                });
            }
            *granularity = requested;
        }
        (PillKind::Sort { direction, .. }, PillEdit::Direction(d)) => *direction = d,
        (PillKind::Join { join_type, .. }, PillEdit::JoinType(t)) => *join_type = t,
        (PillKind::Join { left, .. }, PillEdit::JoinLeft(f)) => *left = Some(f),
        (PillKind::Join { right, .. }, PillEdit::JoinRight(f)) => *right = Some(f),
        (PillKind::Calculated { name, formula }, PillEdit::Formula(new_formula)) => {
            parse_formula(&new_formula).map_err(|error| CompositionError::InvalidFormula {
                name: name.clone(),
                error,
            })?;
            *formula = new_formula;
        }
        (_, edit) => {
            return Err(CompositionError::EditNotApplicable {
                edit: edit.name(),
                slot,
            })
        }
    }
    Ok(())
}
