//! SQLite loader: movie upserts and duplicate-ignoring rating inserts.

use crate::error::Result;
use crate::models::{MovieRecord, RatingRecord};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub const WRITE_BATCH_SIZE: usize = 10_000;

const UPSERT_MOVIE_SQL: &str = "
    INSERT INTO movies (movie_id, title, genres, director, plot, box_office, year)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(movie_id) DO UPDATE SET
        title = excluded.title,
        genres = excluded.genres,
        director = excluded.director,
        plot = excluded.plot,
        box_office = excluded.box_office,
        year = excluded.year";

const INSERT_RATING_SQL: &str = "
    INSERT OR IGNORE INTO ratings (user_id, movie_id, rating, timestamp)
    VALUES (?1, ?2, ?3, ?4)";

pub struct Loader {
    conn: Connection,
}

impl Loader {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS movies (
                movie_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                genres TEXT,
                director TEXT NOT NULL,
                plot TEXT NOT NULL,
                box_office TEXT NOT NULL,
                year INTEGER
            );

            CREATE TABLE IF NOT EXISTS ratings (
                user_id INTEGER NOT NULL,
                movie_id INTEGER NOT NULL,
                rating REAL NOT NULL,
                timestamp INTEGER NOT NULL,
                UNIQUE (user_id, movie_id, timestamp)
            );",
        )?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert, or overwrite every non-key column on movie_id conflict.
    pub fn upsert_movie(&self, record: &MovieRecord) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(UPSERT_MOVIE_SQL)?;
        stmt.execute(params![
            record.movie_id,
            record.title,
            record.genres,
            record.director,
            record.plot,
            record.box_office,
            record.year,
        ])?;
        Ok(())
    }

    /// Upsert a batch inside one transaction.
    pub fn upsert_movies(&mut self, records: &[MovieRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_MOVIE_SQL)?;
            for record in records {
                stmt.execute(params![
                    record.movie_id,
                    record.title,
                    record.genres,
                    record.director,
                    record.plot,
                    record.box_office,
                    record.year,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Bulk insert; rows hitting the (user_id, movie_id, timestamp)
    /// constraint are skipped. Returns the number of rows actually inserted.
    pub fn insert_ratings_ignore_duplicates(
        &mut self,
        records: &[RatingRecord],
        mut on_batch: impl FnMut(usize),
    ) -> Result<usize> {
        let mut inserted = 0;

        for chunk in records.chunks(WRITE_BATCH_SIZE) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(INSERT_RATING_SQL)?;
                for r in chunk {
                    inserted += stmt.execute(params![r.user_id, r.movie_id, r.rating, r.timestamp])?;
                }
            }
            tx.commit()?;
            on_batch(chunk.len());
        }

        Ok(inserted)
    }

    pub fn count_movies(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM movies", [], |row| row.get(0))?)
    }

    pub fn count_ratings(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM ratings", [], |row| row.get(0))?)
    }

    /// Read a movie back by id.
    pub fn get_movie(&self, movie_id: i64) -> Result<Option<MovieRecord>> {
        let movie = self
            .conn
            .query_row(
                "SELECT movie_id, title, genres, year, director, plot, box_office
                 FROM movies WHERE movie_id = ?1",
                [movie_id],
                |row| {
                    Ok(MovieRecord {
                        movie_id: row.get(0)?,
                        title: row.get(1)?,
                        genres: row.get(2)?,
                        year: row.get(3)?,
                        director: row.get(4)?,
                        plot: row.get(5)?,
                        box_office: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(movie)
    }

    /// Close the connection, surfacing any error instead of swallowing it in Drop.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}
