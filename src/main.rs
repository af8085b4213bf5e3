use facecheck::{
    app::App,
    camera::Camera,
    cli::report,
    common::{AttendanceError, BackendKind, Config},
    core::classes::{ClassRequest, FinalizeOutcome},
    core::register::RegistrationRequest,
};

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facecheck")]
#[command(about = "Face recognition attendance")]
struct Cli {
    /// Enable development mode (keeps all data in ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (default: configs/facecheck.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage backend from the config
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Local,
    Remote,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Local => BackendKind::Local,
            BackendArg::Remote => BackendKind::Remote,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new student and capture their photos
    Register {
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        reg_number: Option<String>,
        /// Telegram chat id for class notifications
        #[arg(short, long)]
        telegram_id: Option<String>,
    },
    /// Train the recognizer on all registered students
    Train {
        /// Retrain even when every student is already trained
        #[arg(short, long)]
        force: bool,
    },
    /// Start a live attendance session
    Mark {
        /// Bind the session to a running class
        #[arg(short, long)]
        class: Option<u64>,
    },
    /// List registered students
    Students,
    /// Show attendance dates, or one day's attendance
    Attendance {
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Show today's attendance
        #[arg(long, conflicts_with = "date")]
        today: bool,
    },
    /// List video devices
    Cameras,
    /// Capture one frame and save it with detected faces marked
    TestCamera,
    /// Manage scheduled classes
    Class {
        #[command(subcommand)]
        command: ClassCommands,
    },
}

#[derive(Subcommand)]
enum ClassCommands {
    /// Create a class and plan its reminder
    Create {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        teacher_id: String,
        #[arg(short, long)]
        name: String,
        /// Day of the class (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Start time, HH:MM 24-hour
        #[arg(long)]
        time: String,
        /// Length in whole minutes
        #[arg(long)]
        duration: i64,
    },
    /// List classes
    List {
        /// Only classes that have not ended
        #[arg(short, long)]
        upcoming: bool,
    },
    /// Send reminders whose scheduled time has passed
    NotifyDue,
    /// Send end-of-class attendance notices
    Finalize {
        id: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    match run(cli) {
        Err(AttendanceError::Cancelled) => {
            println!("Cancelled.");
            Ok(())
        }
        other => Ok(other?),
    }
}

fn run(cli: Cli) -> facecheck::Result<()> {
    if let Commands::Cameras = cli.command {
        return list_cameras();
    }

    let config = Config::load(cli.config.as_deref())?;
    let mut app = App::new(config, cli.dev, cli.backend.map(BackendKind::from))?;

    match cli.command {
        Commands::Register { name, reg_number, telegram_id } => {
            let request = RegistrationRequest {
                name: match name {
                    Some(name) => name,
                    None => prompt("Enter Student Name: ")?,
                },
                reg_number: match reg_number {
                    Some(reg) => reg,
                    None => prompt("Enter Registration Number: ")?,
                },
                telegram_id,
            };
            println!("📷 SPACE captures a photo when a face is shown, ESC cancels");
            let student = app.register(&request)?;
            println!("✅ {} registered successfully!", student.name);
        }
        Commands::Train { force } => {
            println!("Training model...");
            let report = app.train(force)?;
            println!("✅ Model trained successfully! ({} faces)", report.samples);
            if !report.without_faces.is_empty() {
                println!("⚠️  No faces found for: {}", report.without_faces.join(", "));
            }
        }
        Commands::Mark { class } => {
            println!("Press ESC to finish marking attendance");
            let outcome = app.mark(class)?;
            println!("{}", outcome.summary);
            if let Some(finalized) = outcome.finalized {
                print_finalize(&finalized);
            }
        }
        Commands::Students => {
            let lines = app.student_lines()?;
            if lines.is_empty() {
                println!("No students registered.");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        Commands::Attendance { date, today } => {
            let date = if today { Some(Local::now().date_naive()) } else { date };
            match date {
                Some(date) => {
                    println!("Attendance for {}", date.format("%Y-%m-%d"));
                    println!("{}", app.attendance_report(date)?);
                }
                None => {
                    let dates = app.attendance_dates()?;
                    if dates.is_empty() {
                        println!("No records found.");
                    }
                    for line in report::date_lines(&dates) {
                        println!("{}", line);
                    }
                }
            }
        }
        Commands::TestCamera => {
            println!("Testing camera...");
            let (path, faces) = app.test_camera()?;
            println!("✅ Saved frame with {} face(s) to {}", faces, path.display());
        }
        Commands::Class { command } => run_class(&mut app, command)?,
        Commands::Cameras => {}
    }

    Ok(())
}

fn run_class(app: &mut App, command: ClassCommands) -> facecheck::Result<()> {
    match command {
        ClassCommands::Create { teacher, teacher_id, name, date, time, duration } => {
            let request = ClassRequest {
                teacher_name: teacher,
                teacher_unique_id: teacher_id,
                class_name: name,
                date: date.unwrap_or_else(|| Local::now().date_naive()),
                class_time: time,
                duration_minutes: duration,
            };
            let (class, delivered) = app.create_class(&request)?;
            println!("✅ Class created successfully. (#{})", class.id);
            match delivered {
                Some(summary) => println!(
                    "Reminders sent: {} sent, {} failed of {}",
                    summary.sent, summary.failed, summary.total
                ),
                None => println!("Reminder status: {}", class.notification_status),
            }
            if let Some(at) = class.notification_scheduled_for {
                println!("Reminder scheduled for {}", at.format("%Y-%m-%d %H:%M"));
            }
        }
        ClassCommands::List { upcoming } => {
            let classes = app.classes(upcoming)?;
            if classes.is_empty() {
                println!("No classes found.");
            }
            for line in report::class_lines(&classes) {
                println!("{}", line);
            }
        }
        ClassCommands::NotifyDue => match app.notify_due()? {
            None => println!("TELEGRAM_BOT_TOKEN is not set, nothing to send."),
            Some(processed) if processed.is_empty() => println!("No reminders due."),
            Some(processed) => {
                for (id, status) in processed {
                    println!("Class #{}: {}", id, status);
                }
            }
        },
        ClassCommands::Finalize { id } => {
            let outcome = app.finalize_class(id)?;
            print_finalize(&outcome);
        }
    }
    Ok(())
}

fn print_finalize(outcome: &FinalizeOutcome) {
    match outcome {
        FinalizeOutcome::AlreadyFinalized => println!("Class attendance notifications already sent."),
        FinalizeOutcome::Finalized(summary) if summary.skipped => {
            println!("Class finalized. Notifications skipped (no bot token).")
        }
        FinalizeOutcome::Finalized(summary) => println!(
            "Class finalized. Notifications: {} sent, {} failed of {}",
            summary.sent, summary.failed, summary.total
        ),
    }
}

fn list_cameras() -> facecheck::Result<()> {
    println!("🔍 Detecting available cameras...\n");

    let cameras = Camera::list_all_cameras()?;
    if cameras.is_empty() {
        println!("❌ No cameras found!");
        println!("\nTroubleshooting:");
        println!("  1. Check if cameras are connected");
        println!("  2. Ensure you have permission to access /dev/video*");
        return Ok(());
    }

    for camera in &cameras {
        let capture = if camera.can_capture { "capture" } else { "no capture" };
        println!("📷 /dev/video{}: {} ({})", camera.index, camera.name, capture);
        if !camera.formats.is_empty() {
            println!("   formats: {}", camera.formats.join(", "));
        }
    }

    println!("\n📝 To pick a camera, set it in the config:");
    println!("   [camera]");
    println!("   device_index = <NUMBER>");
    Ok(())
}

/// Reads one trimmed line; an empty answer cancels.
fn prompt(label: &str) -> facecheck::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        return Err(AttendanceError::Cancelled);
    }
    Ok(value)
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }
}
