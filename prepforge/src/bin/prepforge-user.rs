//! CLI tool for managing PrepForge accounts
//!
//! # Usage
//!
//! ```bash
//! # Add a new user
//! prepforge-user add "Ada Lovelace" ada@example.com password123 --db sqlite://prepforge.db
//!
//! # Give a user unlimited questions
//! prepforge-user set-plan ada@example.com pro
//!
//! # List all users
//! prepforge-user list
//!
//! # Clear today's GRE counter
//! prepforge-user reset-quota ada@example.com GRE
//!
//! # Show the last 20 graded answers
//! prepforge-user history ada@example.com --limit 20
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use prepforge::accounts::{Plan, UserStore};
use prepforge::questions::ProgressStore;
use prepforge::quota::{today, ExamType, QuotaManager, QuotaPolicy, SqliteQuotaStore};
use prepforge::storage;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "prepforge-user")]
#[command(about = "Manage PrepForge user accounts", long_about = None)]
struct Cli {
    /// Database URL (e.g., sqlite://prepforge.db)
    #[arg(short, long, default_value = "sqlite://prepforge.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PlanArg {
    Free,
    Pro,
}

impl From<PlanArg> for Plan {
    fn from(plan: PlanArg) -> Self {
        match plan {
            PlanArg::Free => Plan::Free,
            PlanArg::Pro => Plan::Pro,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new user on the free plan
    Add {
        /// Display name
        name: String,
        /// User email address
        email: String,
        /// User password
        password: String,
    },
    /// Delete a user
    Delete {
        /// User email address
        email: String,
    },
    /// List all users
    List,
    /// Check if user exists
    Exists {
        /// User email address
        email: String,
    },
    /// Change a user's subscription plan
    SetPlan {
        /// User email address
        email: String,
        #[arg(value_enum)]
        plan: PlanArg,
    },
    /// Clear today's question counter for one exam type
    ResetQuota {
        /// User email address
        email: String,
        /// Exam type (e.g., GRE)
        exam_type: String,
    },
    /// Show a user's answer history
    History {
        /// User email address
        email: String,
        /// Number of answers to list
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let pool = storage::connect(&cli.db).await?;
    let users = UserStore::new(pool.clone());

    match cli.command {
        Commands::Add {
            name,
            email,
            password,
        } => {
            println!("Adding user: {}", email);

            if users.user_exists(&email).await? {
                eprintln!("Error: User {} already exists", email);
                std::process::exit(1);
            }

            let user = users.create_user(&name, &email, &password).await?;
            println!("✓ User {} added successfully (id {})", user.email, user.id);
        }
        Commands::Delete { email } => {
            println!("Deleting user: {}", email);

            if !users.user_exists(&email).await? {
                eprintln!("Error: User {} does not exist", email);
                std::process::exit(1);
            }

            users.delete_user(&email).await?;
            println!("✓ User {} deleted successfully", email);
        }
        Commands::List => {
            let all = users.list_users().await?;

            if all.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<6} {:<30} {:<6} {:<20} {:<20}",
                    "ID", "Email", "Plan", "Created At", "Last Login"
                );
                println!("{:-<86}", "");

                for user in &all {
                    println!(
                        "{:<6} {:<30} {:<6} {:<20} {:<20}",
                        user.id,
                        user.email,
                        user.plan,
                        user.created_at,
                        user.last_login.as_deref().unwrap_or("Never")
                    );
                }

                println!("\nTotal: {} user(s)", users.count_users().await?);
            }
        }
        Commands::Exists { email } => {
            if users.user_exists(&email).await? {
                println!("✓ User {} exists", email);
            } else {
                println!("✗ User {} does not exist", email);
                std::process::exit(1);
            }
        }
        Commands::SetPlan { email, plan } => {
            let Some(user) = users.find_by_email(&email).await? else {
                eprintln!("Error: User {} does not exist", email);
                std::process::exit(1);
            };

            let plan = Plan::from(plan);
            users.set_plan(user.id, plan).await?;
            println!("✓ User {} is now on the {} plan", user.email, plan);
        }
        Commands::ResetQuota { email, exam_type } => {
            let Some(user) = users.find_by_email(&email).await? else {
                eprintln!("Error: User {} does not exist", email);
                std::process::exit(1);
            };

            let exam_type = ExamType::parse(Some(&exam_type))?;
            let quota = QuotaManager::new(
                Arc::new(SqliteQuotaStore::new(pool)),
                QuotaPolicy::default(),
            );
            quota.reset(user.id, &exam_type, today()).await?;
            println!("✓ Reset today's {} questions for {}", exam_type, user.email);
        }
        Commands::History { email, limit } => {
            let Some(user) = users.find_by_email(&email).await? else {
                eprintln!("Error: User {} does not exist", email);
                std::process::exit(1);
            };

            let progress = ProgressStore::new(pool);
            let totals = progress.totals_by_exam(user.id).await?;
            if totals.is_empty() {
                println!("No answers recorded for {}.", user.email);
                return Ok(());
            }

            println!("{:<8} {:>8} {:>8}", "Exam", "Answers", "Correct");
            for (exam_type, answers, correct) in &totals {
                println!("{:<8} {:>8} {:>8}", exam_type, answers, correct);
            }

            println!(
                "\n{:<20} {:<6} {:<20} {:<6} {:<7} {:<3}",
                "Answered At", "Exam", "Topic", "Given", "Correct", ""
            );
            println!("{:-<67}", "");
            for answer in progress.recent(user.id, limit).await? {
                println!(
                    "{:<20} {:<6} {:<20} {:<6} {:<7} {:<3}",
                    answer.answered_at.format("%Y-%m-%d %H:%M:%S"),
                    answer.exam_type,
                    answer.topic,
                    answer.user_answer,
                    answer.correct_answer,
                    if answer.is_correct { "✓" } else { "✗" }
                );
            }
        }
    }

    Ok(())
}
