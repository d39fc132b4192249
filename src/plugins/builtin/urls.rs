//! URL history plugin
//!
//! Remembers every URL posted to a channel and points out reposts.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use rusqlite::{params, OptionalExtension};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{error, info, warn};
use url::Url;

use crate::application::errors::PluginError;
use crate::application::messaging::{Connection, EventRegistry};
use crate::domain::entities::{ChannelMessage, UrlMention};
use crate::infrastructure::database::{Database, DatabaseRegistry};
use crate::plugins::trait_def::{InitContext, Plugin, PluginResult};

pub const DEFAULT_DATABASE: &str = "./history.db";

const DRIVER: &str = "sqlite3";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS seen (
    id integer not null primary key,
    url text not null,
    nick text,
    src text not null,
    dst text not null,
    timestamp datetime not null
);
CREATE INDEX IF NOT EXISTS url_idx ON seen (url, dst);
";

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b((?:[a-z][\w-]+:(?:/{1,3}|[a-z0-9%])|www\d{0,3}[.]|[a-z0-9.\-]+[.][a-z]{2,4}/)(?:[^\s()<>]+|\(([^\s()<>]+|(\([^\s()<>]+\)))*\))+(?:\(([^\s()<>]+|(\([^\s()<>]+\)))*\)|[^\s`!()\[\]{};:'".,<>?«»“”‘’]))"#,
    )
    .expect("URL regex is valid")
});

/// A previous posting of a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub nick: String,
    pub when: DateTime<Utc>,
    /// Postings before the current one
    pub count: i64,
}

struct Opened {
    resources: Arc<DatabaseRegistry>,
    db: Database,
}

/// Tracks URLs posted to channels in the shared SQLite database
#[derive(Default)]
pub struct UrlsPlugin {
    opened: Mutex<Option<Opened>>,
}

impl UrlsPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Plugin for UrlsPlugin {
    fn name(&self) -> &str {
        "urls"
    }

    fn description(&self) -> &str {
        "Reports when a URL was posted before"
    }

    fn init(&self, ctx: &InitContext<'_>) -> PluginResult<()> {
        let path = ctx.setting_or("database", DEFAULT_DATABASE)?;
        let db = ctx.resources.open(DRIVER, &path)?;

        let schema = db
            .with(|conn| conn.execute_batch(SCHEMA))
            .map_err(PluginError::from)
            .and_then(|created| created.map_err(PluginError::from));
        if let Err(e) = schema {
            if let Err(close_err) = ctx.resources.close(&db) {
                warn!("Failed to release {}: {}", path, close_err);
            }
            return Err(e);
        }
        info!("URL history in {}", db.key().path.display());

        let events: Weak<EventRegistry> = Arc::downgrade(ctx.events);
        ctx.events.subscribe(move |conn: &Connection, msg: &ChannelMessage| {
            let Some(events) = events.upgrade() else {
                return;
            };
            for url in extract_urls(&msg.text) {
                let mention = UrlMention {
                    line: msg.line.clone(),
                    channel: msg.channel.clone(),
                    url,
                };
                events.dispatch(conn, &mention);
            }
        });

        let history = db.clone();
        ctx.events
            .subscribe(move |conn: &Connection, mention: &UrlMention| handle_url(&history, conn, mention));

        *self.opened.lock().unwrap_or_else(PoisonError::into_inner) = Some(Opened {
            resources: ctx.resources.clone(),
            db,
        });
        Ok(())
    }

    fn teardown(&self) -> PluginResult<()> {
        let opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner).take();
        match opened {
            Some(Opened { resources, db }) => resources.close(&db).map_err(PluginError::from),
            None => Ok(()),
        }
    }
}

fn handle_url(db: &Database, conn: &Connection, mention: &UrlMention) {
    let source = &mention.line.source;
    let recorded = db.with(|sql| {
        record_url(
            sql,
            mention.url.as_str(),
            &source.nick,
            &source.raw,
            &mention.channel,
            Utc::now(),
        )
    });

    match recorded {
        Ok(Ok(Some(seen))) => {
            let msg = format!(
                "URL '{}' was last seen {} ago by {} ({} total)",
                mention.url,
                format_duration(Utc::now() - seen.when),
                seen.nick,
                seen.count
            );
            conn.privmsg(&mention.channel, &msg);
        }
        Ok(Ok(None)) => {}
        Ok(Err(e)) => error!("Failed to record URL {}: {}", mention.url, e),
        Err(e) => error!("URL history unavailable: {}", e),
    }
}

/// Look up the last posting of `url` in `dst`, then record this one.
pub fn record_url(
    conn: &mut rusqlite::Connection,
    url: &str,
    nick: &str,
    src: &str,
    dst: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<Sighting>> {
    let tx = conn.transaction()?;

    let previous = tx
        .query_row(
            "SELECT nick, src, timestamp FROM seen WHERE url = ?1 AND dst = ?2 ORDER BY id DESC LIMIT 1",
            params![url, dst],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                ))
            },
        )
        .optional()?;

    let sighting = match previous {
        Some((nick, src, when)) => {
            let count = tx.query_row(
                "SELECT COUNT(*) FROM seen WHERE url = ?1 AND dst = ?2",
                params![url, dst],
                |row| row.get(0),
            )?;
            Some(Sighting {
                nick: nick.filter(|n| !n.is_empty()).unwrap_or(src),
                when,
                count,
            })
        }
        None => None,
    };

    tx.execute(
        "INSERT INTO seen (url, nick, src, dst, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![url, nick, src, dst, now],
    )?;
    tx.commit()?;
    Ok(sighting)
}

/// URLs in `text` that have a host
pub fn extract_urls(text: &str) -> Vec<Url> {
    URL_REGEX
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| Url::parse(m.as_str()).ok())
        .filter(|url| url.host_str().is_some_and(|host| !host.is_empty()))
        .collect()
}

/// Largest whole unit of `d`: days, hours, minutes or seconds
pub fn format_duration(d: Duration) -> String {
    let hours = d.num_hours();
    if hours >= 24 {
        return pluralize(hours / 24, "day");
    }
    if hours >= 1 {
        return pluralize(hours, "hour");
    }
    let minutes = d.num_minutes();
    if minutes >= 1 {
        return pluralize(minutes, "minute");
    }
    pluralize(d.num_seconds(), "second")
}

fn pluralize(count: i64, unit: &str) -> String {
    if count > 1 {
        format!("{} {}s", count, unit)
    } else {
        format!("{} {}", count, unit)
    }
}
