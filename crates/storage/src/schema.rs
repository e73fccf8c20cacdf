use rusqlite::Connection;

use crate::error::StorageError;

pub fn init_schema(conn: &Connection, prefix: &str) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(&SCHEMA_SQL.replace("{prefix}", prefix))?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS {prefix}datalists (
    name TEXT PRIMARY KEY NOT NULL CHECK (length(name) <= 255),
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS {prefix}entities (
    guid INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL CHECK (type IN ('object', 'user', 'group', 'site')),
    subtype TEXT NOT NULL DEFAULT '',
    owner_guid INTEGER NOT NULL DEFAULT 0,
    container_guid INTEGER NOT NULL DEFAULT 0,
    access_id INTEGER NOT NULL DEFAULT 2,
    time_created INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{prefix}entities_owner ON {prefix}entities (owner_guid);
CREATE INDEX IF NOT EXISTS idx_{prefix}entities_time ON {prefix}entities (time_created);

CREATE TABLE IF NOT EXISTS {prefix}metastrings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    string TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS {prefix}metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_guid INTEGER NOT NULL,
    name_id INTEGER NOT NULL,
    value_id INTEGER NOT NULL,
    value_type TEXT NOT NULL CHECK (value_type IN ('integer', 'text')),
    owner_guid INTEGER NOT NULL DEFAULT 0,
    access_id INTEGER NOT NULL DEFAULT 0,
    time_created INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{prefix}metadata_entity ON {prefix}metadata (entity_guid, name_id);

CREATE TABLE IF NOT EXISTS {prefix}entity_relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guid_one INTEGER NOT NULL,
    relationship TEXT NOT NULL,
    guid_two INTEGER NOT NULL,
    time_created INTEGER NOT NULL,
    UNIQUE (guid_one, relationship, guid_two)
);
CREATE INDEX IF NOT EXISTS idx_{prefix}relationships_two ON {prefix}entity_relationships (guid_two, relationship);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_only_the_prefixed_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, "t_").unwrap();
        init_schema(&conn, "t_").unwrap();

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            tables,
            ["t_datalists", "t_entities", "t_entity_relationships", "t_metadata", "t_metastrings"]
        );
    }
}
