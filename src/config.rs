//! Startup configuration
//!
//! All options come from the command line, are resolved into concrete paths
//! once, and stay immutable for the process lifetime. The request handlers
//! see only the resolved `Config`, never the raw flags.

use std::path::PathBuf;

use clap::Parser;

/// Command-line flags for the demo server
#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Demo server for phrase-indexed question answering", long_about = None)]
pub struct Args {
    /// Root directory of the phrase dump
    pub dump_dir: PathBuf,

    /// Subdirectory of dump_dir holding the phrase dump
    #[arg(long, default_value = "phrase")]
    pub dump_path: String,

    /// Index directory name (relative to dump_dir unless --abs-path)
    #[arg(long, default_value = "default_index")]
    pub index_name: String,

    /// Index file inside the index directory
    #[arg(long, default_value = "index.usearch")]
    pub index_path: String,

    /// Id-mapping file inside the index directory
    #[arg(long, default_value = "idx2id.json")]
    pub idx2id_path: String,

    /// Treat --index-name as an absolute directory
    #[arg(long)]
    pub abs_path: bool,

    /// HTTP listen port
    #[arg(long, default_value_t = 10001)]
    pub port: u16,

    /// Port of the embedding service on localhost
    #[arg(long, default_value_t = 9009)]
    pub api_port: u16,

    /// Drop answers longer than this many tokens
    #[arg(long, default_value_t = 20)]
    pub max_answer_length: usize,

    /// Number of results to return
    #[arg(long, default_value_t = 10)]
    pub top_k: usize,

    /// Dense candidates fetched before sparse rescoring (sparse mode)
    #[arg(long, default_value_t = 1000)]
    pub start_top_k: usize,

    /// Candidates kept after sparse rescoring (sparse mode)
    #[arg(long, default_value_t = 100)]
    pub mid_top_k: usize,

    /// Search expansion factor of the vector index
    #[arg(long, default_value_t = 64)]
    pub nprobe: usize,

    /// Use the sparse-hybrid backend instead of the dense one
    #[arg(long)]
    pub sparse: bool,

    /// TF-IDF ranker file (sparse mode)
    #[arg(long, default_value = "ranker.json")]
    pub ranker_path: PathBuf,

    /// Document-term matrix file (sparse mode)
    #[arg(long, default_value = "doc_mat.sptm")]
    pub doc_mat_path: PathBuf,

    /// Zero padding appended to each query vector
    #[arg(long, default_value_t = 0)]
    pub num_dummy_zeros: usize,

    /// Weight of the sparse score in the combined ranking
    #[arg(long, default_value_t = 0.1)]
    pub sparse_weight: f32,

    /// Sparse scoring kernel: "dp" (dot product) or "cos" (cosine)
    #[arg(long, default_value = "dp")]
    pub sparse_type: String,

    /// Accepted for compatibility; GPU search is not available
    #[arg(long)]
    pub cuda: bool,

    /// Drop empty or non-positive hits after rescoring (sparse mode)
    #[arg(long)]
    pub filter: bool,

    /// Directory holding the prebuilt front end
    #[arg(long, default_value = "static")]
    pub static_dir: PathBuf,
}

/// Resolved, immutable server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Phrase dump directory: <dump_dir>/<dump_path>
    pub dump_dir: PathBuf,
    /// Vector index file
    pub index_path: PathBuf,
    /// Id-mapping file
    pub idx2id_path: PathBuf,
    /// Static front-end directory
    pub static_dir: PathBuf,
    pub port: u16,
    pub api_port: u16,
    pub max_answer_length: usize,
    pub top_k: usize,
    pub start_top_k: usize,
    pub mid_top_k: usize,
    pub nprobe: usize,
    pub sparse: bool,
    pub ranker_path: PathBuf,
    pub doc_mat_path: PathBuf,
    pub num_dummy_zeros: usize,
    pub sparse_weight: f32,
    pub sparse_type: String,
    pub cuda: bool,
    pub filter: bool,
}

impl Config {
    /// Resolve raw flags into concrete paths.
    ///
    /// The index directory is `<dump_dir>/<index_name>` by default; with
    /// `--abs-path` the index name is taken as an absolute directory.
    pub fn from_args(args: Args) -> Self {
        let index_dir = if args.abs_path {
            PathBuf::from(&args.index_name)
        } else {
            args.dump_dir.join(&args.index_name)
        };

        Self {
            dump_dir: args.dump_dir.join(&args.dump_path),
            index_path: index_dir.join(&args.index_path),
            idx2id_path: index_dir.join(&args.idx2id_path),
            static_dir: args.static_dir,
            port: args.port,
            api_port: args.api_port,
            max_answer_length: args.max_answer_length,
            top_k: args.top_k,
            start_top_k: args.start_top_k,
            mid_top_k: args.mid_top_k,
            nprobe: args.nprobe,
            sparse: args.sparse,
            ranker_path: args.ranker_path,
            doc_mat_path: args.doc_mat_path,
            num_dummy_zeros: args.num_dummy_zeros,
            sparse_weight: args.sparse_weight,
            sparse_type: args.sparse_type,
            cuda: args.cuda,
            filter: args.filter,
        }
    }
}
