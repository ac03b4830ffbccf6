//! Terminal client for the Deluge daemon: connection management, the
//! torrent list and the status bar, driven by a component registry.

pub mod colors;
pub mod columns;
pub mod component;
pub mod connect;
pub mod hostlist;
pub mod shell;
pub mod statusbar;
pub mod torrentview;
pub mod tui;
