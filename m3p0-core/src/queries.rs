//! SQL used against the tracking table
//!
//! Written for DuckDB. Revisions are bound as hyphenated strings and cast to
//! UUID; they are read back as VARCHAR so the driver never sees a UUID value.

pub const IS_TABLE_EXISTS_QUERY: &str = "
SELECT COUNT(*) > 0
FROM information_schema.tables
WHERE table_name = 'm3p0_migrations'
";

pub const CREATE_TABLE_SCRIPT: &str = "
CREATE SEQUENCE m3p0_migrations_id_seq START 1;
CREATE TABLE m3p0_migrations (
    id BIGINT PRIMARY KEY DEFAULT nextval('m3p0_migrations_id_seq'),
    version VARCHAR,
    revision UUID NOT NULL UNIQUE,
    is_applied BOOLEAN NOT NULL DEFAULT TRUE,
    applied_at TIMESTAMP DEFAULT current_timestamp
);
";

pub const IS_VERSION_ALREADY_EXIST: &str = "
SELECT COUNT(*) > 0
FROM m3p0_migrations
WHERE version = ?
";

pub const RETRIEVE_SORTED_REVISIONS: &str = "
SELECT CAST(revision AS VARCHAR) AS revision
FROM m3p0_migrations
WHERE is_applied
ORDER BY id ASC
";

pub const RETRIEVE_APPLIED_RECORDS: &str = "
SELECT id,
       version,
       CAST(revision AS VARCHAR) AS revision,
       is_applied,
       CAST(applied_at AS VARCHAR) AS applied_at
FROM m3p0_migrations
WHERE is_applied
ORDER BY id ASC
";

pub const INSERT_APPLIED_REVISION: &str = "
INSERT INTO m3p0_migrations (version, revision, is_applied)
VALUES (?, CAST(? AS UUID), TRUE)
";

pub const DELETE_REVISION: &str = "
DELETE FROM m3p0_migrations
WHERE revision = CAST(? AS UUID)
";
