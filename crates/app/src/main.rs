use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use services::api::UploadFile;
use services::config::ConfigError;
use services::{
    ApiError, ClientConfig, Clock, FlashcardApi, HttpFlashcardApi, InMemoryBackend,
    StudyController, StudySession, UploadService,
};
use storage::repository::Storage;
use study_core::model::{
    CardFields, ContentId, Flashcard, IdConvention, KeyConcept, KeyConceptRef, ReviewGrade,
};
use study_core::session::{AuthState, StudyMode, View};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingContent,
    UnknownArg(String),
    InvalidMode { raw: String },
    InvalidGrade { raw: String },
    InvalidSeed { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingContent => write!(f, "--content is required for this command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidMode { raw } => write!(f, "invalid --mode value: {raw}"),
            ArgsError::InvalidGrade { raw } => write!(f, "invalid --grade value: {raw}"),
            ArgsError::InvalidSeed { raw } => write!(f, "invalid --seed value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- cards       --content <id> [options]");
    eprintln!("  cargo run -p app -- study       --content <id> --grade <again|hard|good|easy> [options]");
    eprintln!("  cargo run -p app -- progress    --content <id> [options]");
    eprintln!("  cargo run -p app -- reset-intro --content <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- upload      <file>... [--demo]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --mode fast|recall       study mode (default: fast)");
    eprintln!("  --starred                only starred cards");
    eprintln!("  --key-concept <id>       only cards for this key concept (repeatable)");
    eprintln!("  --shuffle                shuffle the deck");
    eprintln!("  --seed <n>               fixed shuffle seed");
    eprintln!("  --db <sqlite_url>        local state database");
    eprintln!("  --demo                   use a built-in in-memory backend");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_API_BASE_URL, STUDY_API_TOKEN, STUDY_DB_URL, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Cards,
    Study,
    Progress,
    ResetIntro,
    Upload,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "cards" => Some(Self::Cards),
            "study" => Some(Self::Study),
            "progress" => Some(Self::Progress),
            "reset-intro" => Some(Self::ResetIntro),
            "upload" => Some(Self::Upload),
            _ => None,
        }
    }
}

struct Args {
    content: Option<String>,
    mode: StudyMode,
    starred: bool,
    key_concepts: Vec<String>,
    shuffle: bool,
    seed: Option<u64>,
    grade: Option<ReviewGrade>,
    db_url: Option<String>,
    demo: bool,
    files: Vec<PathBuf>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>, cmd: Command) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            content: None,
            mode: StudyMode::FastReview,
            starred: false,
            key_concepts: Vec::new(),
            shuffle: false,
            seed: None,
            grade: None,
            db_url: None,
            demo: false,
            files: Vec::new(),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--content" => parsed.content = Some(require_value(args, "--content")?),
                "--mode" => {
                    let value = require_value(args, "--mode")?;
                    parsed.mode = parse_mode(&value)?;
                }
                "--starred" => parsed.starred = true,
                "--key-concept" => parsed
                    .key_concepts
                    .push(require_value(args, "--key-concept")?),
                "--shuffle" => parsed.shuffle = true,
                "--seed" => {
                    let value = require_value(args, "--seed")?;
                    let seed = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSeed { raw: value.clone() })?;
                    parsed.seed = Some(seed);
                }
                "--grade" => {
                    let value = require_value(args, "--grade")?;
                    parsed.grade = Some(parse_grade(&value)?);
                }
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(normalize_sqlite_url(value));
                }
                "--demo" => parsed.demo = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if cmd == Command::Upload && !arg.starts_with("--") => {
                    parsed.files.push(PathBuf::from(arg));
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if cmd != Command::Upload && parsed.content.is_none() {
            return Err(ArgsError::MissingContent);
        }
        if cmd == Command::Study && parsed.grade.is_none() {
            return Err(ArgsError::MissingValue { flag: "--grade" });
        }
        Ok(parsed)
    }
}

fn parse_mode(raw: &str) -> Result<StudyMode, ArgsError> {
    match raw {
        "fast" | "fast-review" => Ok(StudyMode::FastReview),
        "recall" | "active-recall" => Ok(StudyMode::ActiveRecall),
        _ => Err(ArgsError::InvalidMode { raw: raw.into() }),
    }
}

fn parse_grade(raw: &str) -> Result<ReviewGrade, ArgsError> {
    ReviewGrade::ALL
        .into_iter()
        .find(|grade| grade.label().eq_ignore_ascii_case(raw))
        .ok_or_else(|| ArgsError::InvalidGrade { raw: raw.into() })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Environment config, falling back to a local placeholder backend for `--demo`.
fn load_config(demo: bool) -> Result<ClientConfig, ConfigError> {
    match ClientConfig::from_env() {
        Err(ConfigError::MissingVar(_)) if demo => {
            let vars = HashMap::from([(
                "STUDY_API_BASE_URL".to_string(),
                "http://localhost:8080/".to_string(),
            )]);
            ClientConfig::from_map(&vars)
        }
        other => other,
    }
}

fn demo_backend(clock: Clock) -> Result<InMemoryBackend, ApiError> {
    let backend = InMemoryBackend::new(clock);
    let content = ContentId::new("demo").map_err(|e| ApiError::Decode(e.to_string()))?;
    let convention = IdConvention::default();
    let now = clock.now();
    let concept = KeyConcept {
        id: "kc-ownership".into(),
        collection: "keyConcepts".into(),
        label: "Ownership".into(),
        source: None,
    };
    let samples = [
        ("What does a move do to the source binding?", "It can no longer be used.", true),
        ("How many mutable borrows may coexist?", "Exactly one.", true),
        ("What trait makes a type copy on assignment?", "Copy.", false),
        ("What does `?` do with an Err?", "Returns it early, converted with From.", false),
    ];
    let cards = samples
        .iter()
        .zip(0u32..)
        .map(|(&(question, answer, owned), idx)| {
            Flashcard::new(
                convention.classify(format!("cfc-demo-{idx}")),
                CardFields {
                    question: question.into(),
                    answer: answer.into(),
                    is_starred: idx % 2 == 0,
                    key_concept: owned.then(|| KeyConceptRef {
                        id: concept.id.clone(),
                        collection: concept.collection.clone(),
                    }),
                    ..CardFields::blank(idx, now)
                },
            )
        })
        .collect();
    backend.seed_cards(&content, cards)?;
    backend.seed_key_concepts(&content, vec![concept])?;
    Ok(backend)
}

fn auth_for(config: &ClientConfig, demo: bool) -> AuthState {
    if demo || config.api_token.is_some() {
        AuthState::Authenticated {
            user_id: "cli".into(),
        }
    } else {
        AuthState::Anonymous
    }
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        Some("txt" | "md") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn print_deck(session: &StudySession) {
    println!(
        "content {} [{}]: {} card(s)",
        session.content_id(),
        session.state.view(),
        session.deck().len()
    );
    for card in session.deck() {
        let star = if card.fields.is_starred { "*" } else { " " };
        let badge = session
            .badge_for(card)
            .map(|label| format!(" [{label}]"))
            .unwrap_or_default();
        println!("{star} {:>3} {}{badge}", card.idx(), card.fields.question);
    }
}

fn print_progress(session: &StudySession) {
    let progress = session.progress();
    println!(
        "new {}/{}  review {}/{}",
        progress.new_completed,
        progress.new_completed + progress.new_pending,
        progress.review_completed,
        progress.review_completed + progress.review_pending
    );
    if progress.is_done_for_today() {
        println!("all done for today");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Cards,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    if !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter, cmd).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let config = load_config(parsed.demo)?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let clock = Clock::system();
    let api: Arc<dyn FlashcardApi> = if parsed.demo {
        Arc::new(demo_backend(clock)?)
    } else {
        Arc::new(HttpFlashcardApi::from_config(&config))
    };
    let auth = auth_for(&config, parsed.demo);

    if cmd == Command::Upload {
        let files = parsed
            .files
            .iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
                std::fs::read(path).map(|bytes| UploadFile::new(name, content_type_for(path), bytes))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let outcomes = UploadService::new(api).upload_all(&files).await;
        for outcome in &outcomes {
            match &outcome.result {
                Ok(key) => println!("{}: uploaded as {key}", outcome.file_name),
                Err(err) => println!("{}: {err}", outcome.file_name),
            }
        }
        return Ok(());
    }

    let db_url = parsed
        .db_url
        .clone()
        .unwrap_or_else(|| normalize_sqlite_url(config.database_url.clone()));
    prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url).await?;

    let mut controller = StudyController::from_config(&config, api, &storage, clock);
    if let Some(seed) = parsed.seed {
        controller = controller.with_shuffle_seed(seed);
    }

    let raw_content = parsed.content.clone().ok_or(ArgsError::MissingContent)?;
    let content_id = ContentId::new(raw_content)?;

    if cmd == Command::ResetIntro {
        controller.reset_intro(&content_id).await?;
        println!("intro will be shown again for {content_id}");
        return Ok(());
    }

    let mut session = controller.load(content_id, parsed.mode).await?;
    if parsed.starred || parsed.shuffle || !parsed.key_concepts.is_empty() {
        controller
            .update_modifiers(&mut session, |modifiers| {
                modifiers.set_show_only_starred(parsed.starred);
                if parsed.shuffle {
                    modifiers.toggle_shuffle();
                }
                for id in &parsed.key_concepts {
                    modifiers.toggle_key_concept(id);
                }
            })
            .await?;
    }

    match cmd {
        Command::Cards => print_deck(&session),
        Command::Progress => {
            print_progress(&session);
            let buckets = controller.rating_buckets(&session).await?;
            for grade in ReviewGrade::ALL {
                let count = match grade {
                    ReviewGrade::Again => buckets.again,
                    ReviewGrade::Hard => buckets.hard,
                    ReviewGrade::Good => buckets.good,
                    ReviewGrade::Easy => buckets.easy,
                };
                println!("{:>6}: {count}", grade.label());
            }
            println!("unrated: {}", buckets.unrated);
        }
        Command::Study => {
            let grade = parsed.grade.ok_or(ArgsError::MissingValue { flag: "--grade" })?;
            if session.state.view() == View::ActiveRecallIntro {
                controller.start_studying(&mut session, &auth).await?;
            }
            if session.deck().is_empty() {
                println!("nothing to study right now");
            }
            let mut rated = 0usize;
            while session.state.view() == View::Display {
                let Some(card) = session.current_card() else {
                    break;
                };
                println!("Q: {}", card.fields.question);
                println!("A: {}", card.fields.answer);
                controller.rate(&mut session, grade, &auth).await?;
                rated += 1;
            }
            info!(rated, grade = grade.label(), "study run finished");
            print_progress(&session);
        }
        Command::ResetIntro | Command::Upload => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
