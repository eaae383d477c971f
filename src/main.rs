//! txtbook - convert text novels to EPUB and back

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

use txtbook::convert::{ConvertConfig, TxtConverter};
use txtbook::extract::{
    BookInfo, ExtractConfig, book_info, extract_cover, rename_library, retag_file,
    write_chapter_files, write_cover, write_text,
};
use txtbook::segment::{DEFAULT_PATTERN, SegmentOptions};
use txtbook::{TextEncoding, TextSource, read_epub};

#[derive(Parser)]
#[command(name = "txtbook")]
#[command(version, about = "Convert plain-text novels to EPUB and back", long_about = None)]
#[command(after_help = "EXAMPLES:
    txtbook convert novel.txt                 Write novel.epub next to the text
    txtbook convert novel.txt -e auto --step 20
    txtbook toc novel.txt                     Preview detected chapter titles
    txtbook extract novel.epub --per-chapter  One text file per chapter
    txtbook extract novel.epub --simplified   Convert to Simplified Chinese")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress output messages and logs
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a text file to EPUB
    Convert(ConvertArgs),

    /// List the chapter titles found in a text file
    Toc {
        /// Input text file
        input: PathBuf,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show the metadata of an EPUB
    Info {
        /// Input EPUB file
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract the text of an EPUB
    Extract {
        /// Input EPUB file
        input: PathBuf,

        /// Output text file [default: INPUT with .txt extension]
        output: Option<PathBuf>,

        /// Write one file per chapter document (OUTPUT1.txt, OUTPUT2.txt, ...)
        #[arg(long)]
        per_chapter: bool,

        /// Output encoding
        #[arg(short, long, default_value = "utf-8")]
        encoding: String,

        /// Do not append the end-of-chapter marker
        #[arg(long)]
        no_marker: bool,

        /// Also save the cover image next to the output
        #[arg(long)]
        cover: bool,

        /// Convert Traditional Chinese to Simplified Chinese
        #[arg(long)]
        simplified: bool,
    },

    /// Rewrite the title, author, contributor or date of an EPUB in place
    Retag {
        /// EPUB file to edit
        input: PathBuf,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        contributor: Option<String>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Rename every EPUB below a directory to "<title>_<author>.epub"
    Rename {
        /// Library directory
        dir: PathBuf,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Chapter heading regular expression
    #[arg(short, long, default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// Source encoding label (utf-8, gbk, gb18030, big5, ...) or "auto"
    #[arg(short, long, default_value = "utf-8")]
    encoding: TextEncoding,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input text file
    input: PathBuf,

    /// Output EPUB file [default: INPUT with .epub extension]
    output: Option<PathBuf>,

    /// Book title [default: file name]
    #[arg(long)]
    title: Option<String>,

    /// Book author [default: title]
    #[arg(long)]
    author: Option<String>,

    /// Cover image
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Chapters per XHTML document
    #[arg(long, default_value_t = 1)]
    step: usize,

    /// Keep the text before the first heading as a leading chapter
    #[arg(long)]
    keep_preface: bool,

    /// Title of the leading chapter kept by --keep-preface
    #[arg(long, default_value = "前言")]
    preface_title: String,

    /// Replace undecodable bytes instead of failing
    #[arg(long)]
    lossy: bool,

    #[command(flatten)]
    source: SourceArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LevelFilter::OFF
    } else {
        match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: could not install logger: {e}");
    }

    match run(cli.command, cli.quiet) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, quiet: bool) -> txtbook::Result<()> {
    match command {
        Commands::Convert(args) => convert(args, quiet),
        Commands::Toc { input, source } => toc(&input, source, quiet),
        Commands::Info { input, json } => info(&input, json),
        Commands::Extract {
            input,
            output,
            per_chapter,
            encoding,
            no_marker,
            cover,
            simplified,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("txt"));
            let mut config = ExtractConfig::default()
                .with_encoding(encoding)
                .with_simplify(simplified);
            if no_marker {
                config = config.with_end_marker(None);
            }
            extract(&input, &output, per_chapter, cover, &config, quiet)
        }
        Commands::Retag {
            input,
            title,
            author,
            contributor,
            date,
        } => {
            let book = read_epub(&input)?;
            let current = book_info(&book);
            let info = BookInfo {
                title: title.unwrap_or(current.title),
                creator: author.unwrap_or(current.creator),
                contributor: contributor.unwrap_or(current.contributor),
                date: date.unwrap_or(current.date),
            };
            retag_file(&input, &info)?;
            if !quiet {
                println!("Retagged {}: {} / {}", input.display(), info.title, info.creator);
            }
            Ok(())
        }
        Commands::Rename { dir } => {
            let report = rename_library(&dir)?;
            if !quiet {
                for (from, to) in &report.renamed {
                    println!("{} -> {}", from.display(), to.display());
                }
                println!(
                    "Renamed {} file(s), {} unchanged, {} failed",
                    report.renamed.len(),
                    report.unchanged.len(),
                    report.failed.len()
                );
            }
            Ok(())
        }
    }
}

fn converter(source: SourceArgs, config: ConvertConfig, lossy: bool) -> txtbook::Result<TxtConverter> {
    let config = config
        .with_pattern(source.pattern)
        .with_source(TextSource::new(source.encoding).with_lossy(lossy));
    TxtConverter::new(config)
}

fn convert(args: ConvertArgs, quiet: bool) -> txtbook::Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("epub"));

    let mut config = ConvertConfig::default().with_step(args.step).with_segment_options(
        SegmentOptions::default()
            .with_keep_preface(args.keep_preface)
            .with_preface_title(args.preface_title),
    );
    if let Some(title) = args.title {
        config = config.with_title(title);
    }
    if let Some(author) = args.author {
        config = config.with_author(author);
    }
    if let Some(cover) = args.cover {
        config = config.with_cover(cover);
    }

    let book = converter(args.source, config, args.lossy)?.convert(&args.input, &output)?;
    if !quiet {
        println!(
            "{} -> {} ({} chapters)",
            args.input.display(),
            output.display(),
            book.toc.len()
        );
    }
    Ok(())
}

fn toc(input: &Path, source: SourceArgs, quiet: bool) -> txtbook::Result<()> {
    let titles = converter(source, ConvertConfig::default(), true)?.table_of_contents(input)?;
    write_toc(&mut std::io::stdout().lock(), &titles, quiet)?;
    Ok(())
}

fn write_toc<W: Write>(out: &mut W, titles: &[String], quiet: bool) -> std::io::Result<()> {
    if quiet {
        return Ok(());
    }
    if titles.is_empty() {
        writeln!(out, "no chapters found")?;
    }
    for (index, title) in titles.iter().enumerate() {
        writeln!(out, "{:>5}  {title}", index + 1)?;
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct InfoReport<'a> {
    #[serde(flatten)]
    info: BookInfo,
    language: &'a str,
    identifier: &'a str,
    description: Option<&'a str>,
    documents: usize,
    toc_entries: usize,
    cover: Option<&'a str>,
}

fn info(input: &Path, json: bool) -> txtbook::Result<()> {
    let book = read_epub(input)?;
    let meta = &book.metadata;
    let report = InfoReport {
        info: book_info(&book),
        language: &meta.language,
        identifier: &meta.identifier,
        description: meta.description.as_deref(),
        documents: book.documents().count(),
        toc_entries: book.toc.len(),
        cover: extract_cover(&book).map(|c| c.href),
    };

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| txtbook::Error::Io(e.into()))?;
        println!("{out}");
        return Ok(());
    }

    println!("File: {}", input.display());
    println!("Title: {}", report.info.title);
    println!("Author: {}", report.info.creator);
    println!("Contributor: {}", report.info.contributor);
    println!("Date: {}", report.info.date);
    if !report.language.is_empty() {
        println!("Language: {}", report.language);
    }
    if !report.identifier.is_empty() {
        println!("Identifier: {}", report.identifier);
    }
    if let Some(desc) = report.description {
        let desc = desc.trim();
        match desc.char_indices().nth(200) {
            Some((end, _)) => println!("Description: {}...", &desc[..end]),
            None => println!("Description: {desc}"),
        }
    }
    println!("Documents: {}", report.documents);
    println!("TOC entries: {}", report.toc_entries);
    if let Some(cover) = report.cover {
        println!("Cover: {cover}");
    }
    Ok(())
}

fn extract(
    input: &Path,
    output: &Path,
    per_chapter: bool,
    cover: bool,
    config: &ExtractConfig,
    quiet: bool,
) -> txtbook::Result<()> {
    let book = read_epub(input)?;

    if per_chapter {
        let files = write_chapter_files(&book, output, config)?;
        if !quiet {
            println!("{} -> {} chapter file(s)", input.display(), files.len());
        }
    } else {
        write_text(&book, output, config)?;
        if !quiet {
            println!("{} -> {}", input.display(), output.display());
        }
    }

    if cover {
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        match write_cover(&book, dir)? {
            Some(path) if !quiet => println!("cover -> {}", path.display()),
            Some(_) => {}
            None => tracing::warn!(book = %input.display(), "book has no cover image"),
        }
    }
    Ok(())
}
