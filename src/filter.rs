use std::str::FromStr;

use rusqlite::ToSql;

use crate::fields::{Field, FieldValue};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    // Longest operators first so "<=" is not read as "<".
    const OPERATORS: [(&'static str, Cmp); 6] = [
        ("!=", Cmp::Ne),
        ("<=", Cmp::Le),
        (">=", Cmp::Ge),
        ("=", Cmp::Eq),
        ("<", Cmp::Lt),
        (">", Cmp::Gt),
    ];

    pub fn sql(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "!=",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: Field,
    pub cmp: Cmp,
    pub value: FieldValue,
}

impl Condition {
    pub fn new(field: Field, cmp: Cmp, value: FieldValue) -> Self {
        Condition { field, cmp, value }
    }
}

/// Parses `field<op>value`, e.g. `status>=400` or `country=Finland`.
impl FromStr for Condition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let at = s
            .find(|c| matches!(c, '!' | '<' | '>' | '='))
            .ok_or_else(|| Error::InvalidFilter(s.to_owned()))?;
        let (name, rest) = s.split_at(at);
        let (op, cmp) = Cmp::OPERATORS
            .iter()
            .find(|(op, _)| rest.starts_with(op))
            .ok_or_else(|| Error::InvalidFilter(s.to_owned()))?;

        let field = name.trim().parse::<Field>()?;
        if !field.spec().indexable {
            return Err(Error::InvalidField(field.name().to_owned()));
        }
        let value = field.parse_value(&rest[op.len()..])?;
        Ok(Condition::new(field, *cmp, value))
    }
}

/// Conjunction of conditions. Empty matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Builds a `WHERE` clause (or nothing) and its positional parameters.
    pub(crate) fn where_clause(&self) -> (String, Vec<&dyn ToSql>) {
        if self.conditions.is_empty() {
            return (String::new(), Vec::new());
        }
        let clause = self
            .conditions
            .iter()
            .map(|c| format!("{} {} ?", c.field.column(), c.cmp.sql()))
            .collect::<Vec<_>>()
            .join(" AND ");
        let params = self
            .conditions
            .iter()
            .map(|c| &c.value as &dyn ToSql)
            .collect();
        (format!(" WHERE {}", clause), params)
    }
}

impl FromIterator<Condition> for Filter {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        Filter {
            conditions: iter.into_iter().collect(),
        }
    }
}
