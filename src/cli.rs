use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Log at debug level (RUST_LOG takes precedence)
    #[clap(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve `GET /search` over http.
    Serve {
        /// Address to bind, overrides `server.bind`
        #[clap(short, long)]
        bind: Option<String>,
    },

    /// Run a single search against a running server and print the response.
    Search {
        /// Free-text query
        query: String,

        /// keyword, semantic or hybrid
        #[clap(short, long)]
        mode: Option<String>,

        /// compact or full
        #[clap(short, long)]
        scope: Option<String>,

        /// Only bookmarks in this folder
        #[clap(short, long)]
        folder_id: Option<String>,

        /// Only bookmarks of this type (link, article, video, image)
        #[clap(short = 't', long = "type")]
        kind: Option<String>,

        /// Maximum number of results (capped by the server)
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Interactive search: every stdin line replaces the query.
    ///
    /// Lines starting with `:` are commands: `:refresh`, `:mode <mode>`,
    /// `:clear`, `:quit`.
    Watch {
        /// keyword, semantic or hybrid
        #[clap(short, long)]
        mode: Option<String>,
    },
}
