//! Record serializers for each export format

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{self, Write};

use super::ExportFormat;
use crate::models::{Author, Item, ItemStatus};
use crate::storage::ItemTag;

/// Streaming writer for one export
///
/// One of the `begin_*` methods is always called, even when no records follow,
/// so formats with a header or envelope produce valid output for an empty result.
pub(crate) trait RecordWriter {
    fn begin_items(&mut self) -> io::Result<()>;
    fn begin_tags(&mut self) -> io::Result<()>;
    fn item(&mut self, item: &Item) -> io::Result<()>;
    fn tag(&mut self, tag: &ItemTag) -> io::Result<()>;
    fn finish(&mut self) -> io::Result<()>;
}

/// Build the writer for `format` over `out`
pub(crate) fn writer_for<'w>(format: ExportFormat, out: &'w mut dyn Write) -> Box<dyn RecordWriter + 'w> {
    match format {
        ExportFormat::Json => Box::new(JsonArrayWriter::new(out)),
        ExportFormat::Csv => Box::new(CsvRecordWriter::new(out)),
        ExportFormat::Karakeep => Box::new(KarakeepWriter { out }),
    }
}

/// Item as written to JSON exports
#[derive(Serialize)]
struct ItemRecord<'a> {
    item_id: &'a str,
    status: Option<ItemStatus>,
    favorite: bool,
    given_url: Option<&'a str>,
    resolved_url: Option<&'a str>,
    given_title: Option<&'a str>,
    resolved_title: Option<&'a str>,
    excerpt: Option<&'a str>,
    lang: Option<&'a str>,
    domain: Option<&'a str>,
    word_count: Option<i64>,
    time_to_read: Option<i64>,
    time_added: Option<DateTime<Utc>>,
    time_updated: Option<DateTime<Utc>>,
    time_read: Option<DateTime<Utc>>,
    time_favorited: Option<DateTime<Utc>>,
    time_deleted: Option<DateTime<Utc>>,
    tags: &'a BTreeSet<String>,
    authors: &'a [Author],
}

impl<'a> From<&'a Item> for ItemRecord<'a> {
    fn from(item: &'a Item) -> Self {
        Self {
            item_id: item.id.as_str(),
            status: item.status,
            favorite: item.is_favorite(),
            given_url: item.given_url.as_deref(),
            resolved_url: item.resolved_url.as_deref(),
            given_title: item.given_title.as_deref(),
            resolved_title: item.resolved_title.as_deref(),
            excerpt: item.excerpt.as_deref(),
            lang: item.lang.as_deref(),
            domain: item.domain.as_deref(),
            word_count: item.word_count,
            time_to_read: item.time_to_read,
            time_added: item.time_added,
            time_updated: item.time_updated,
            time_read: item.time_read,
            time_favorited: item.time_favorited,
            time_deleted: item.time_deleted,
            tags: &item.tags,
            authors: &item.authors,
        }
    }
}

struct JsonArrayWriter<'w> {
    out: &'w mut dyn Write,
    written: usize,
}

impl<'w> JsonArrayWriter<'w> {
    fn new(out: &'w mut dyn Write) -> Self {
        Self { out, written: 0 }
    }

    fn element<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let separator: &[u8] = if self.written == 0 { b"\n" } else { b",\n" };
        self.out.write_all(separator)?;
        serde_json::to_writer_pretty(&mut *self.out, value)?;
        self.written += 1;
        Ok(())
    }
}

impl RecordWriter for JsonArrayWriter<'_> {
    fn begin_items(&mut self) -> io::Result<()> {
        self.out.write_all(b"[")
    }

    fn begin_tags(&mut self) -> io::Result<()> {
        self.out.write_all(b"[")
    }

    fn item(&mut self, item: &Item) -> io::Result<()> {
        self.element(&ItemRecord::from(item))
    }

    fn tag(&mut self, tag: &ItemTag) -> io::Result<()> {
        self.element(tag)
    }

    fn finish(&mut self) -> io::Result<()> {
        let close: &[u8] = if self.written == 0 { b"]\n" } else { b"\n]\n" };
        self.out.write_all(close)?;
        self.out.flush()
    }
}

/// Column order for CSV item exports
const CSV_ITEM_HEADER: [&str; 18] = [
    "item_id",
    "status",
    "favorite",
    "given_url",
    "resolved_url",
    "given_title",
    "resolved_title",
    "excerpt",
    "lang",
    "domain",
    "word_count",
    "time_to_read",
    "time_added",
    "time_updated",
    "time_read",
    "time_favorited",
    "time_deleted",
    "tags",
];

const CSV_TAG_HEADER: [&str; 2] = ["item_id", "tag"];

struct CsvRecordWriter<'w> {
    writer: csv::Writer<&'w mut dyn Write>,
}

impl<'w> CsvRecordWriter<'w> {
    fn new(out: &'w mut dyn Write) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(out),
        }
    }
}

fn opt_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_time(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

impl RecordWriter for CsvRecordWriter<'_> {
    fn begin_items(&mut self) -> io::Result<()> {
        Ok(self.writer.write_record(CSV_ITEM_HEADER)?)
    }

    fn begin_tags(&mut self) -> io::Result<()> {
        Ok(self.writer.write_record(CSV_TAG_HEADER)?)
    }

    fn item(&mut self, item: &Item) -> io::Result<()> {
        let tags = item.tags.iter().cloned().collect::<Vec<_>>().join(",");
        let row = [
            item.id.to_string(),
            opt_string(item.status.map(|s| s.code())),
            (item.is_favorite() as u8).to_string(),
            opt_string(item.given_url.as_deref()),
            opt_string(item.resolved_url.as_deref()),
            opt_string(item.given_title.as_deref()),
            opt_string(item.resolved_title.as_deref()),
            opt_string(item.excerpt.as_deref()),
            opt_string(item.lang.as_deref()),
            opt_string(item.domain.as_deref()),
            opt_string(item.word_count),
            opt_string(item.time_to_read),
            opt_time(item.time_added),
            opt_time(item.time_updated),
            opt_time(item.time_read),
            opt_time(item.time_favorited),
            opt_time(item.time_deleted),
            tags,
        ];
        Ok(self.writer.write_record(&row)?)
    }

    fn tag(&mut self, tag: &ItemTag) -> io::Result<()> {
        Ok(self.writer.write_record([tag.item_id.as_str(), tag.tag.as_str()])?)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Karakeep tag reference
#[derive(Serialize)]
struct KarakeepTag<'a> {
    #[serde(rename = "tagName")]
    tag_name: &'a str,
}

/// A Karakeep link-bookmark create request plus the tags to attach to it
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KarakeepBookmark<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
    archived: bool,
    favourited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    tags: Vec<KarakeepTag<'a>>,
}

impl<'a> KarakeepBookmark<'a> {
    /// Build a bookmark request, or `None` for items without a URL
    fn from_item(item: &'a Item) -> Option<Self> {
        Some(Self {
            kind: "link",
            url: item.url()?,
            title: item.title(),
            summary: item.excerpt.as_deref(),
            archived: item.status == Some(ItemStatus::Archived),
            favourited: item.is_favorite(),
            created_at: item.time_added,
            tags: item.tags.iter().map(|t| KarakeepTag { tag_name: t }).collect(),
        })
    }
}

/// Whether `format` can represent `item`
pub(crate) fn accepts(format: ExportFormat, item: &Item) -> bool {
    match format {
        ExportFormat::Karakeep => item.url().is_some(),
        ExportFormat::Json | ExportFormat::Csv => true,
    }
}

/// JSON lines, one bookmark request per item
struct KarakeepWriter<'w> {
    out: &'w mut dyn Write,
}

impl RecordWriter for KarakeepWriter<'_> {
    fn begin_items(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn begin_tags(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "karakeep export only supports the items table",
        ))
    }

    fn item(&mut self, item: &Item) -> io::Result<()> {
        let Some(bookmark) = KarakeepBookmark::from_item(item) else {
            return Ok(());
        };
        serde_json::to_writer(&mut *self.out, &bookmark)?;
        self.out.write_all(b"\n")
    }

    fn tag(&mut self, _tag: &ItemTag) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "karakeep export only supports the items table",
        ))
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
