pub mod artifacts;
pub mod markdown;
pub mod tabular;

pub use artifacts::{ExportedRun, Exporter, RunOutput};
pub use markdown::render_markdown;
pub use tabular::{
    read_comments, read_comments_from, read_records, read_records_from, write_comments,
    write_records, CommentRow, PostRow,
};
