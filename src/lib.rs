//! # deepseek-chat-export
//!
//! A CLI tool that exports your [DeepSeek](https://chat.deepseek.com) chat history
//! to a single JSON file.
//!
//! ## What it does
//!
//! DeepSeek has no export API for regular users. This tool opens a real Chrome/Chromium
//! window through WebDriver, reusing your browser profile so an existing login carries
//! over (or letting you log in by hand), then calls the web app's own API from inside
//! the page: first the paginated list of chat sessions, then the full message history
//! of each session. The result is written as a JSON array, one element per session.
//!
//! ## Incremental export
//!
//! On repeated runs the previous output file is read back and indexed by session id.
//! A session whose `updated_at` on the server is not newer than the saved copy is
//! reused without downloading it again. If downloading a changed session fails, the
//! saved copy is kept rather than dropping the session from the export.
//!
//! The output file is only replaced once the session list was fetched completely, and
//! is replaced atomically.
//!
//! ## Usage
//!
//! ```sh
//! # Export to ./chat_data.json
//! deepseek-chat-export
//!
//! # Export somewhere else
//! deepseek-chat-export -o ~/backups/deepseek.json
//! ```
//!
//! Browser and WebDriver settings can be persisted in
//! `~/.config/deepseek-chat-export/config.toml`. Logging verbosity follows `RUST_LOG`.
pub mod api;
pub mod browser;
pub mod catalog;
pub mod config;
pub mod export;
pub mod model;
pub mod store;
pub mod sync;
