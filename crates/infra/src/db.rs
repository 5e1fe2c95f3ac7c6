//! Rendering of [`ResourceFilter`]s into SQL `WHERE` conditions.
//!
//! Values are always bound, never interpolated. Column names come from code
//! and are checked to be plain identifiers before being pushed.
//!
//! | filter                     | SQL                                   |
//! |----------------------------|---------------------------------------|
//! | scope `field = v`          | `field::text = $n`                    |
//! | `IdRestriction::Any`       | (nothing)                             |
//! | `IdRestriction::Only(ids)` | `id::text = ANY($n)`                  |
//! | `Only` with no ids         | `FALSE`                               |
//! | `IdRestriction::Excluding` | `NOT (id::text = ANY($n))`            |
//! | no constraint at all       | `TRUE`                                |

use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;

use factgate_auth::{IdRestriction, ResourceFilter};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("not a plain column identifier: '{0}'")]
pub struct InvalidColumn(pub String);

fn check_column(name: &str) -> Result<&str, InvalidColumn> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(InvalidColumn(name.to_string()))
    }
}

/// Appends `filter` as one boolean condition over `id_column`.
pub fn push_filter<'args>(
    qb: &mut QueryBuilder<'args, Postgres>,
    filter: &ResourceFilter,
    id_column: &str,
) -> Result<(), InvalidColumn> {
    let id_column = check_column(id_column)?;
    for constraint in filter.scope() {
        check_column(&constraint.field)?;
    }

    if filter.is_empty_result() {
        qb.push("FALSE");
        return Ok(());
    }

    let mut conditions = 0;
    for constraint in filter.scope() {
        if conditions > 0 {
            qb.push(" AND ");
        }
        qb.push(format!("{}::text = ", constraint.field));
        qb.push_bind(constraint.value.clone());
        conditions += 1;
    }

    let ids = match filter.ids() {
        IdRestriction::Any => None,
        IdRestriction::Only(ids) => Some((false, ids)),
        IdRestriction::Excluding(ids) if ids.is_empty() => None,
        IdRestriction::Excluding(ids) => Some((true, ids)),
    };
    if let Some((negated, ids)) = ids {
        if conditions > 0 {
            qb.push(" AND ");
        }
        if negated {
            qb.push("NOT (");
        }
        qb.push(format!("{id_column}::text = ANY("));
        qb.push_bind(ids.iter().cloned().collect::<Vec<String>>());
        qb.push(")");
        if negated {
            qb.push(")");
        }
        conditions += 1;
    }

    if conditions == 0 {
        qb.push("TRUE");
    }
    Ok(())
}
