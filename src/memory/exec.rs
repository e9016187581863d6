//! Query evaluation over memory tables.
//!
//! Rows of the joined tables are combined with nested-loop joins, filtered,
//! grouped in order of first appearance, aggregated, sorted and paged.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Number, Value};

use super::{MemoryBackend, MemoryTable};
use crate::execute::{check_preconditions, ExecutionError, ExecutionResult, PageInfo, QueryResult};
use crate::query::{
    plain, Aggregation, FieldRef, FilterOperator, FilterSpec, FormulaExpr, JoinType,
    QueryDefinition, SortDirection,
};

/// Calculated fields nested deeper than this evaluate to null.
const MAX_FORMULA_DEPTH: usize = 32;

/// Row indices into each joined table; `None` for an unmatched left join.
type Combined = Vec<Option<usize>>;

struct Step {
    left: FieldRef,
    right: FieldRef,
    join_type: JoinType,
}

struct Frame<'a> {
    tables: Vec<&'a MemoryTable>,
    formulas: HashMap<&'a str, FormulaExpr>,
}

impl Frame<'_> {
    fn value(&self, row: &Combined, field: &FieldRef) -> Value {
        self.value_at(row, field, 0)
    }

    fn value_at(&self, row: &Combined, field: &FieldRef, depth: usize) -> Value {
        if field.is_calculated() {
            if depth > MAX_FORMULA_DEPTH {
                return Value::Null;
            }
            let Some(expr) = self.formulas.get(field.name.as_str()) else {
                return Value::Null;
            };
            let result = expr.evaluate(&|f: &FieldRef| as_number(&self.value_at(row, f, depth + 1)));
            return number_value(result);
        }

        let Some(pos) = self.tables.iter().position(|t| t.name == field.table) else {
            return Value::Null;
        };
        let table = self.tables[pos];
        match (row.get(pos).copied().flatten(), table.column_index(&field.name)) {
            (Some(r), Some(c)) => table.value(r, c).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

pub(super) fn execute(backend: &MemoryBackend, def: &QueryDefinition) -> ExecutionResult<QueryResult> {
    check_preconditions(def)?;
    check_references(backend, def)?;

    let mut formulas = HashMap::new();
    for calc in &def.calculated_fields {
        let expr = calc.parse().map_err(|e| {
            ExecutionError::Rejected(format!("Invalid formula for '{}': {}", calc.name, e))
        })?;
        formulas.insert(calc.name.as_str(), expr);
    }

    let (tables, steps) = plan_joins(backend, def)?;
    let frame = Frame { tables, formulas };
    let mut rows = join_rows(&frame, &steps);

    rows.retain(|row| def.filters.iter().all(|f| matches_filter(&frame, row, f)));

    let mut output = if def.is_aggregated() {
        aggregate(&frame, def, &rows)
    } else {
        sort_rows(&frame, def, &mut rows);
        rows.iter()
            .map(|row| def.columns.iter().map(|c| frame.value(row, &c.field)).collect())
            .collect()
    };
    if def.is_aggregated() {
        sort_output(def, &mut output);
    }

    let total_rows = output.len() as u64;
    let pagination = PageInfo::compute(def.pagination.page, def.pagination.page_size, total_rows);
    if pagination.page_size > 0 {
        let start = (pagination.current_page as usize - 1) * pagination.page_size as usize;
        output = output
            .into_iter()
            .skip(start)
            .take(pagination.page_size as usize)
            .collect();
    }

    Ok(QueryResult {
        headers: def.headers(),
        rows: output,
        pagination,
        total_rows,
    })
}

pub(super) fn distinct_values(backend: &MemoryBackend, field: &FieldRef) -> ExecutionResult<Vec<Value>> {
    let (table, column) = resolve(backend, field)?;
    let mut values: Vec<Value> = Vec::new();
    for row in table.rows() {
        if let Some(v) = row.get(column) {
            if !v.is_null() && !values.contains(v) {
                values.push(v.clone());
            }
        }
    }
    values.sort_by(compare_values);
    Ok(values)
}

fn resolve<'a>(backend: &'a MemoryBackend, field: &FieldRef) -> ExecutionResult<(&'a MemoryTable, usize)> {
    backend
        .table(&field.table)
        .and_then(|t| t.column_index(&field.name).map(|c| (t, c)))
        .ok_or_else(|| ExecutionError::Rejected(format!("Unknown field: {}", field)))
}

fn check_references(backend: &MemoryBackend, def: &QueryDefinition) -> ExecutionResult<()> {
    for field in def.referenced_fields() {
        if field.is_calculated() {
            if def.calculated(&field.name).is_none() {
                return Err(ExecutionError::Rejected(format!(
                    "Unknown calculated field: {}",
                    field.name
                )));
            }
            if def.is_circular(&field.name) {
                return Err(ExecutionError::Rejected(format!(
                    "Calculated field '{}' refers to itself",
                    field.name
                )));
            }
            for reference in def.formula_references(&field.name) {
                resolve(backend, &reference)?;
            }
        } else {
            resolve(backend, &field)?;
        }
    }
    for join in &def.joins {
        resolve(backend, &join.left)?;
        resolve(backend, &join.right)?;
    }
    Ok(())
}

/// Order tables so each one joins onto an earlier one. Explicit joins are
/// preferred over declared relationships.
fn plan_joins<'a>(
    backend: &'a MemoryBackend,
    def: &QueryDefinition,
) -> ExecutionResult<(Vec<&'a MemoryTable>, Vec<Step>)> {
    let referenced = def.referenced_tables();
    let mut joined: Vec<String> = referenced.first().cloned().into_iter().collect();
    let mut steps = Vec::new();

    loop {
        let remaining: Vec<&String> = referenced.iter().filter(|t| !joined.contains(t)).collect();
        if remaining.is_empty() {
            break;
        }

        let explicit = def
            .joins
            .iter()
            .find(|j| joined.contains(&j.left.table) != joined.contains(&j.right.table));
        if let Some(join) = explicit {
            let (left, right) = if joined.contains(&join.left.table) {
                (join.left.clone(), join.right.clone())
            } else {
                (join.right.clone(), join.left.clone())
            };
            joined.push(right.table.clone());
            steps.push(Step {
                left,
                right,
                join_type: join.join_type,
            });
            continue;
        }

        let path = remaining.iter().find_map(|target| {
            joined
                .iter()
                .find_map(|source| backend.graph().find_path(source, target))
        });
        let Some(path) = path else {
            let names: Vec<&str> = remaining.iter().map(|t| t.as_str()).collect();
            return Err(ExecutionError::Rejected(format!(
                "No join path connects tables: {}",
                names.join(", ")
            )));
        };
        for join in path {
            if !joined.contains(&join.right.table) {
                joined.push(join.right.table.clone());
                steps.push(Step {
                    left: join.left,
                    right: join.right,
                    join_type: JoinType::Inner,
                });
            }
        }
    }

    let tables = joined
        .iter()
        .map(|name| {
            backend
                .table(name)
                .ok_or_else(|| ExecutionError::Rejected(format!("Unknown table: {}", name)))
        })
        .collect::<ExecutionResult<Vec<_>>>()?;
    Ok((tables, steps))
}

fn join_rows(frame: &Frame<'_>, steps: &[Step]) -> Vec<Combined> {
    let Some(root) = frame.tables.first() else {
        return vec![Vec::new()];
    };
    let mut rows: Vec<Combined> = (0..root.rows().len()).map(|r| vec![Some(r)]).collect();

    for (i, step) in steps.iter().enumerate() {
        let right = frame.tables[i + 1];
        let right_col = right.column_index(&step.right.name);
        let mut next = Vec::with_capacity(rows.len());
        for row in rows {
            let key = frame.value(&row, &step.left);
            let mut matched = false;
            for (r, values) in right.rows().iter().enumerate() {
                let candidate = right_col.and_then(|c| values.get(c)).unwrap_or(&Value::Null);
                if loose_eq(&key, candidate) {
                    let mut combined = row.clone();
                    combined.push(Some(r));
                    next.push(combined);
                    matched = true;
                }
            }
            if !matched && step.join_type == JoinType::Left {
                let mut combined = row;
                combined.push(None);
                next.push(combined);
            }
        }
        rows = next;
    }
    rows
}

fn matches_filter(frame: &Frame<'_>, row: &Combined, filter: &FilterSpec) -> bool {
    let value = filter.granularity.bucket_value(&frame.value(row, &filter.field));
    match filter.operator {
        FilterOperator::IsNull => value.is_null(),
        FilterOperator::IsNotNull => !value.is_null(),
        _ if value.is_null() || filter.value.is_null() => false,
        FilterOperator::Equals => loose_eq(&value, &filter.value),
        FilterOperator::NotEquals => !loose_eq(&value, &filter.value),
        FilterOperator::GreaterThan => compare_values(&value, &filter.value) == Ordering::Greater,
        FilterOperator::GreaterOrEqual => compare_values(&value, &filter.value) != Ordering::Less,
        FilterOperator::LessThan => compare_values(&value, &filter.value) == Ordering::Less,
        FilterOperator::LessOrEqual => compare_values(&value, &filter.value) != Ordering::Greater,
        FilterOperator::Contains => plain(&value)
            .to_lowercase()
            .contains(&plain(&filter.value).to_lowercase()),
    }
}

fn aggregate(frame: &Frame<'_>, def: &QueryDefinition, rows: &[Combined]) -> Vec<Vec<Value>> {
    let mut keys: Vec<Vec<Value>> = Vec::new();
    let mut members: Vec<Vec<&Combined>> = Vec::new();

    for row in rows {
        let key: Vec<Value> = def
            .groups
            .iter()
            .map(|g| g.granularity.bucket_value(&frame.value(row, &g.field)))
            .collect();
        match keys.iter().position(|k| *k == key) {
            Some(i) => members[i].push(row),
            None => {
                keys.push(key);
                members.push(vec![row]);
            }
        }
    }

    // An ungrouped aggregate over no rows still yields one row.
    if def.groups.is_empty() && keys.is_empty() {
        keys.push(Vec::new());
        members.push(Vec::new());
    }

    keys.into_iter()
        .zip(members)
        .map(|(mut key, group)| {
            for column in &def.columns {
                let values: Vec<Value> = group.iter().map(|r| frame.value(r, &column.field)).collect();
                key.push(reduce(column.aggregation, &values));
            }
            key
        })
        .collect()
}

fn reduce(aggregation: Aggregation, values: &[Value]) -> Value {
    let numbers = || values.iter().filter_map(as_number);
    match aggregation {
        Aggregation::None => values.first().cloned().unwrap_or(Value::Null),
        Aggregation::Count => Value::from(values.iter().filter(|v| !v.is_null()).count() as u64),
        Aggregation::Sum => {
            let mut seen = false;
            let total = numbers().inspect(|_| seen = true).sum::<f64>();
            if seen {
                number_value(Some(total))
            } else {
                Value::Null
            }
        }
        Aggregation::Avg => {
            let (sum, count) = numbers().fold((0.0, 0usize), |(s, c), n| (s + n, c + 1));
            if count == 0 {
                Value::Null
            } else {
                number_value(Some(sum / count as f64))
            }
        }
        Aggregation::Min => number_value(numbers().reduce(f64::min)),
        Aggregation::Max => number_value(numbers().reduce(f64::max)),
    }
}

fn sort_rows(frame: &Frame<'_>, def: &QueryDefinition, rows: &mut [Combined]) {
    if def.sorts.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        def.sorts
            .iter()
            .map(|s| {
                let ord = compare_values(&frame.value(a, &s.field), &frame.value(b, &s.field));
                directed(ord, s.direction)
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Sort aggregated rows by the output column carrying each sort field.
fn sort_output(def: &QueryDefinition, rows: &mut [Vec<Value>]) {
    let keys: Vec<(usize, SortDirection)> = def
        .sorts
        .iter()
        .filter_map(|s| {
            let idx = def
                .groups
                .iter()
                .position(|g| g.field == s.field)
                .or_else(|| {
                    def.columns
                        .iter()
                        .position(|c| c.field == s.field)
                        .map(|i| i + def.groups.len())
                });
            if idx.is_none() {
                tracing::debug!(field = %s.field, "sort field not in aggregated output, ignored");
            }
            idx.map(|i| (i, s.direction))
        })
        .collect();
    if keys.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|(i, dir)| {
                let ord = match (a.get(*i), b.get(*i)) {
                    (Some(x), Some(y)) => compare_values(x, y),
                    _ => Ordering::Equal,
                };
                directed(ord, *dir)
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn directed(ord: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number_value(n: Option<f64>) -> Value {
    n.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null)
}

/// Equality across representations: `1`, `1.0` and `"1"` are equal. Null
/// equals nothing.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => plain(a) == plain(b),
    }
}

/// Nulls first, numbers numerically, everything else by text.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => plain(a).cmp(&plain(b)),
    }
}
