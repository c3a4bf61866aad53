use tokio_rusqlite::rusqlite::{OptionalExtension, params_from_iter};
use tokio_rusqlite::{Connection, params, rusqlite};

use super::failed;
use crate::core::catalog::{ComponentFilter, ComponentScope, QueryError};
use crate::core::models::{Component, LocationRecord};

const COMPONENT_COLUMNS: &str = "c.id, c.name, c.file_type, c.version_id, c.size";

/// `?2, ?3, ...` for `count` ids following the location parameter.
fn placeholders(count: usize) -> String {
    (2..count + 2)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn component_sql(scope: &ComponentScope) -> (String, &[String]) {
    let present = "JOIN component_locations cl ON cl.component_id = c.id AND cl.location_id = ?1";
    match scope {
        ComponentScope::Projects(ids) => {
            let list = placeholders(ids.len());
            let sql = format!(
                "SELECT {COMPONENT_COLUMNS} FROM components c
                 JOIN versions v ON v.id = c.version_id
                 JOIN contexts ctx ON ctx.id = v.context_id
                 {present}
                 WHERE ctx.project_id IN ({list}) OR v.context_id IN ({list})
                 ORDER BY c.rowid"
            );
            (sql, ids)
        }
        ComponentScope::Contexts(ids) => {
            let list = placeholders(ids.len());
            let sql = format!(
                "WITH RECURSIVE scope(id) AS (
                     SELECT id FROM contexts WHERE id IN ({list})
                     UNION
                     SELECT child.id FROM contexts child JOIN scope ON child.parent_id = scope.id
                 )
                 SELECT {COMPONENT_COLUMNS} FROM components c
                 JOIN versions v ON v.id = c.version_id
                 {present}
                 WHERE v.context_id IN (SELECT id FROM scope)
                 ORDER BY c.rowid"
            );
            (sql, ids)
        }
        ComponentScope::Versions(ids) => {
            let list = placeholders(ids.len());
            let sql = format!(
                "SELECT {COMPONENT_COLUMNS} FROM components c
                 {present}
                 WHERE c.version_id IN ({list})
                 ORDER BY c.rowid"
            );
            (sql, ids)
        }
        ComponentScope::Components(ids) => {
            let list = placeholders(ids.len());
            let sql = format!(
                "SELECT {COMPONENT_COLUMNS} FROM components c
                 {present}
                 WHERE c.id IN ({list})
                 ORDER BY c.rowid"
            );
            (sql, ids)
        }
    }
}

pub async fn query_components(
    conn: &Connection,
    filter: &ComponentFilter,
) -> Result<Vec<Component>, QueryError> {
    let (sql, ids) = component_sql(&filter.scope);
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut values = Vec::with_capacity(ids.len() + 1);
    values.push(filter.location_id.clone());
    values.extend(ids.iter().cloned());

    conn.call(move |c| {
        let mut stmt = c.prepare(&sql)?;
        let components = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(Component {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    file_type: row.get(2)?,
                    version_id: row.get(3)?,
                    size: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok::<_, rusqlite::Error>(components)
    })
    .await
    .map_err(failed)
}

fn location_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocationRecord> {
    Ok(LocationRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        label: row.get(2)?,
    })
}

pub async fn list_locations(conn: &Connection) -> Result<Vec<LocationRecord>, QueryError> {
    conn.call(|c| {
        let mut stmt = c.prepare("SELECT id, name, label FROM locations ORDER BY created_at, rowid")?;
        let locations = stmt
            .query_map([], location_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok::<_, rusqlite::Error>(locations)
    })
    .await
    .map_err(failed)
}

pub async fn get_location(conn: &Connection, id: &str) -> Result<Option<LocationRecord>, QueryError> {
    let id = id.to_string();
    conn.call(move |c| {
        c.query_row(
            "SELECT id, name, label FROM locations WHERE id = ?1",
            params![id],
            location_from_row,
        )
        .optional()
    })
    .await
    .map_err(failed)
}

pub async fn insert_location(
    conn: &Connection,
    id: &str,
    name: &str,
    label: Option<&str>,
) -> Result<LocationRecord, QueryError> {
    let record = LocationRecord {
        id: id.to_string(),
        name: name.to_string(),
        label: label.map(str::to_string),
    };
    let row = record.clone();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO locations (id, name, label) VALUES (?1, ?2, ?3)",
            params![row.id, row.name, row.label],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(failed)?;
    Ok(record)
}

pub async fn ensure_location(conn: &Connection, name: &str) -> Result<LocationRecord, QueryError> {
    let name = name.to_string();
    let candidate = uuid::Uuid::now_v7().to_string();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO locations (id, name) VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING",
            params![candidate, &name],
        )?;
        c.query_row(
            "SELECT id, name, label FROM locations WHERE name = ?1",
            params![&name],
            location_from_row,
        )
    })
    .await
    .map_err(failed)
}

pub async fn resource_identifier(
    conn: &Connection,
    component_id: &str,
    location_id: &str,
) -> Result<Option<String>, QueryError> {
    let component_id = component_id.to_string();
    let location_id = location_id.to_string();
    conn.call(move |c| {
        c.query_row(
            "SELECT resource_identifier FROM component_locations
             WHERE component_id = ?1 AND location_id = ?2",
            params![component_id, location_id],
            |row| row.get(0),
        )
        .optional()
    })
    .await
    .map_err(failed)
}

pub async fn add_component_location(
    conn: &Connection,
    component_id: &str,
    location_id: &str,
    resource_identifier: &str,
) -> Result<(), QueryError> {
    let component_id = component_id.to_string();
    let location_id = location_id.to_string();
    let resource_identifier = resource_identifier.to_string();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO component_locations (component_id, location_id, resource_identifier)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(component_id, location_id) DO UPDATE SET
                resource_identifier = excluded.resource_identifier",
            params![component_id, location_id, resource_identifier],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(failed)
}

pub async fn component_path(conn: &Connection, component_id: &str) -> Result<Vec<String>, QueryError> {
    let id = component_id.to_string();
    let found = conn
        .call(move |c| {
            let version: Option<(String, String, u32)> = c
                .query_row(
                    "SELECT v.context_id, v.asset, v.version
                     FROM components c JOIN versions v ON v.id = c.version_id
                     WHERE c.id = ?1",
                    params![&id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((context_id, asset, version)) = version else {
                return Ok::<_, rusqlite::Error>(None);
            };

            let mut stmt = c.prepare(
                "WITH RECURSIVE chain(id, name, parent_id, depth, seen) AS (
                     SELECT id, name, parent_id, 0, '/' || id || '/' FROM contexts WHERE id = ?1
                     UNION ALL
                     SELECT p.id, p.name, p.parent_id, chain.depth + 1, chain.seen || p.id || '/'
                     FROM contexts p JOIN chain ON p.id = chain.parent_id
                     WHERE instr(chain.seen, '/' || p.id || '/') = 0
                 )
                 SELECT name FROM chain ORDER BY depth DESC",
            )?;
            let mut segments = stmt
                .query_map(params![&context_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            segments.push(asset);
            segments.push(format!("v{:03}", version));
            Ok(Some(segments))
        })
        .await
        .map_err(failed)?;

    found.ok_or_else(|| QueryError::NotFound {
        entity: "Component",
        id: component_id.to_string(),
    })
}

pub async fn insert_project(conn: &Connection, id: &str, name: &str) -> Result<(), QueryError> {
    let id = id.to_string();
    let name = name.to_string();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO contexts (id, project_id, parent_id, name) VALUES (?1, ?1, NULL, ?2)",
            params![id, name],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(failed)
}

pub async fn insert_context(
    conn: &Connection,
    id: &str,
    parent_id: &str,
    name: &str,
) -> Result<(), QueryError> {
    let id = id.to_string();
    let parent_id = parent_id.to_string();
    let name = name.to_string();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO contexts (id, project_id, parent_id, name)
             VALUES (?1, COALESCE((SELECT project_id FROM contexts WHERE id = ?2), ?2), ?2, ?3)",
            params![id, parent_id, name],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(failed)
}

pub async fn insert_version(
    conn: &Connection,
    id: &str,
    context_id: &str,
    asset: &str,
    version: u32,
) -> Result<(), QueryError> {
    let id = id.to_string();
    let context_id = context_id.to_string();
    let asset = asset.to_string();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO versions (id, context_id, asset, version) VALUES (?1, ?2, ?3, ?4)",
            params![id, context_id, asset, version],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(failed)
}

pub async fn insert_component(conn: &Connection, component: &Component) -> Result<(), QueryError> {
    let component = component.clone();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO components (id, version_id, name, file_type, size)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                component.id,
                component.version_id,
                component.name,
                component.file_type,
                component.size
            ],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_follow_location_parameter() {
        assert_eq!(placeholders(3), "?2, ?3, ?4");
        assert_eq!(placeholders(0), "");
    }
}
