pub mod batch;
pub mod comment_import;
pub mod comments;
pub mod config;
pub mod grammar;
pub mod html;
pub mod hyperlink;
pub mod reformat;
pub mod renumber;
pub mod runtime;
pub mod secrets;
pub mod site;
pub mod wrap;
pub mod wordpress;
