//! FamGate Admin CLI
//!
//! Administration tool for the approval workflow.
//!
//! # Usage
//!
//! ```bash
//! famgate-admin parent register p1 pat@example.com --name Pat --filter-level strict
//! famgate-admin parent pending
//! famgate-admin parent approve p1 --admin root
//! famgate-admin child register c1 kid@example.com --parent-email pat@example.com
//! famgate-admin child approve c1 --parent p1
//! famgate-admin invite create <family-id>
//! famgate-admin user suspend c1 --actor p1 --reason "bedtime"
//! ```
//!
//! # Environment Variables
//!
//! - `FAMGATE_DATABASE_PATH`: SQLite database (default: ~/.local/share/famgate/famgate.db)

use clap::{Args, Parser, Subcommand};
use famgate_core::{
    check_access, ApprovalService, Error, Family, FamilyManager, FilterLevel, InviteLookup,
    InviteService, ParentLink, RecordKind, RegistrationService, SqliteStore, Store, SystemClock,
    UserProfile,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "famgate-admin")]
#[command(version)]
#[command(about = "FamGate approval administration tool")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, short, global = true, env = "FAMGATE_DATABASE_PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parent registration and approval
    Parent(ParentCommand),
    /// Child registration and approval
    Child(ChildCommand),
    /// Account status
    User(UserCommand),
    /// Family invite codes
    Invite(InviteCommand),
    /// Family membership and settings
    Family(FamilyCommand),
}

#[derive(Args)]
struct ParentCommand {
    #[command(subcommand)]
    command: ParentSubcommand,
}

#[derive(Subcommand)]
enum ParentSubcommand {
    /// Register a parent awaiting approval
    Register {
        uid: String,
        email: String,
        #[arg(long, short)]
        name: Option<String>,
        /// STRICT, MODERATE or NONE
        #[arg(long, default_value = "MODERATE")]
        filter_level: FilterLevel,
    },
    /// Approve a parent and create their family
    Approve {
        uid: String,
        #[arg(long)]
        admin: String,
    },
    /// Reject a parent
    Reject {
        uid: String,
        #[arg(long)]
        admin: String,
        #[arg(long)]
        reason: String,
    },
    /// List parents awaiting approval
    Pending,
}

#[derive(Args)]
struct ChildCommand {
    #[command(subcommand)]
    command: ChildSubcommand,
}

#[derive(Subcommand)]
enum ChildSubcommand {
    /// Register a child awaiting their parent's approval
    Register {
        uid: String,
        email: String,
        #[arg(long, short)]
        name: Option<String>,
        /// Email of an approved parent
        #[arg(long, conflicts_with = "invite", required_unless_present = "invite")]
        parent_email: Option<String>,
        /// Family invite code
        #[arg(long)]
        invite: Option<String>,
    },
    /// Approve a child into the parent's family
    Approve {
        uid: String,
        #[arg(long)]
        parent: String,
    },
    /// Reject a child
    Reject {
        uid: String,
        #[arg(long)]
        parent: String,
        #[arg(long)]
        reason: String,
    },
    /// List children awaiting a parent's approval
    Pending {
        #[arg(long)]
        parent: String,
    },
}

#[derive(Args)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand)]
enum UserSubcommand {
    /// Show a profile and whether it may use the proxy
    Show { uid: String },
    /// Suspend an account
    Suspend {
        uid: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        reason: String,
    },
    /// Restore a suspended account to APPROVED
    Unsuspend { uid: String },
}

#[derive(Args)]
struct InviteCommand {
    #[command(subcommand)]
    command: InviteSubcommand,
}

#[derive(Subcommand)]
enum InviteSubcommand {
    /// Issue a 48 hour invite code for a family
    Create { family_id: String },
    /// Check what an invite code resolves to
    Check { code: String },
}

#[derive(Args)]
struct FamilyCommand {
    #[command(subcommand)]
    command: FamilySubcommand,
}

#[derive(Subcommand)]
enum FamilySubcommand {
    /// Create a family for an existing parent
    Create { parent: String },
    /// Show a family by id, or by parent with --parent
    Show {
        family_id: Option<String>,
        #[arg(long, conflicts_with = "family_id")]
        parent: Option<String>,
    },
    /// List approved children of a family
    Children { family_id: String },
    /// Add a child to a family
    AddChild { family_id: String, child: String },
    /// Remove a child from a family
    RemoveChild { family_id: String, child: String },
    /// Change family settings
    Set {
        family_id: String,
        #[arg(long)]
        filter_level: FilterLevel,
    },
}

// ============================================================================
// Services
// ============================================================================

struct Services {
    store: Store,
    registration: RegistrationService,
    approval: ApprovalService,
    families: FamilyManager,
    invites: InviteService,
}

impl Services {
    async fn open(path: &Path) -> Result<Self, Error> {
        let store = Store::new(SqliteStore::open(path).await?);
        let clock = Arc::new(SystemClock);
        Ok(Self {
            registration: RegistrationService::new(store.clone(), clock.clone()),
            approval: ApprovalService::new(store.clone(), clock.clone()),
            families: FamilyManager::new(store.clone(), clock.clone()),
            invites: InviteService::new(store.clone(), clock),
            store,
        })
    }
}

/// Default database: <data_dir>/famgate/famgate.db
fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("famgate")
        .join("famgate.db")
}

// ============================================================================
// Output
// ============================================================================

fn print_profile(profile: &UserProfile) {
    println!("{}", profile.uid);
    println!("  Email: {}", profile.email);
    if let Some(name) = &profile.display_name {
        println!("  Name: {}", name);
    }
    println!("  Role: {}", profile.role);
    println!("  Status: {}", profile.approval_status);
    println!("  Filter: {}", profile.filter_level);
    if let Some(parent) = &profile.parent_uid {
        println!("  Parent: {}", parent);
    }
    if let Some(family) = &profile.family_id {
        println!("  Family: {}", family);
    }
    if !profile.children_uids.is_empty() {
        let children: Vec<&str> = profile.children_uids.iter().collect();
        println!("  Children: {}", children.join(", "));
    }
    if let Some(reason) = &profile.rejected_reason {
        println!("  Reason: {}", reason);
    }
}

fn print_family(family: &Family) {
    println!("Family {}", family.id);
    println!("  Parent: {}", family.parent_uid);
    println!("  Filter: {}", family.filter_level());
    println!("  Created: {}", family.created_at.to_rfc3339());
    println!("  Children: {}", family.children_uids.len());
    for child in family.children_uids.iter() {
        println!("    {}", child);
    }
}

fn print_profiles(profiles: &[UserProfile], empty: &str) {
    if profiles.is_empty() {
        println!("{}", empty);
        return;
    }

    println!("{:<24} {:<36} {:<16} {:<10}", "UID", "EMAIL", "ROLE", "STATUS");
    println!("{}", "-".repeat(88));
    for p in profiles {
        println!(
            "{:<24} {:<36} {:<16} {:<10}",
            p.uid, p.email, p.role, p.approval_status
        );
    }
    println!();
    println!("Total: {} profile(s)", profiles.len());
}

// ============================================================================
// Commands
// ============================================================================

async fn run_parent(s: &Services, cmd: ParentSubcommand) -> Result<(), Error> {
    match cmd {
        ParentSubcommand::Register {
            uid,
            email,
            name,
            filter_level,
        } => {
            let profile = s
                .registration
                .register_parent(&uid, &email, name.as_deref(), filter_level)
                .await?;
            println!("Registered parent (awaiting approval):");
            print_profile(&profile);
        }
        ParentSubcommand::Approve { uid, admin } => {
            let family = s.approval.approve_parent_request(&admin, &uid).await?;
            println!("Approved parent: {}", uid);
            print_family(&family);
        }
        ParentSubcommand::Reject { uid, admin, reason } => {
            s.approval
                .reject_parent_request(&admin, &uid, &reason)
                .await?;
            println!("Rejected parent: {}", uid);
        }
        ParentSubcommand::Pending => {
            let pending = s.approval.pending_parent_requests().await?;
            print_profiles(&pending, "No parents awaiting approval.");
        }
    }
    Ok(())
}

async fn run_child(s: &Services, cmd: ChildSubcommand) -> Result<(), Error> {
    match cmd {
        ChildSubcommand::Register {
            uid,
            email,
            name,
            parent_email,
            invite,
        } => {
            let link = match (parent_email, invite) {
                (Some(email), _) => ParentLink::ParentEmail(email),
                (None, Some(code)) => ParentLink::InviteCode(code),
                (None, None) => {
                    return Err(Error::Validation(
                        "either --parent-email or --invite is required".into(),
                    ))
                }
            };
            let profile = s
                .registration
                .register_child(&uid, &email, name.as_deref(), &link)
                .await?;
            println!("Registered child (awaiting parent approval):");
            print_profile(&profile);
        }
        ChildSubcommand::Approve { uid, parent } => {
            let child = s.approval.approve_child_request(&parent, &uid).await?;
            println!("Approved child:");
            print_profile(&child);
        }
        ChildSubcommand::Reject {
            uid,
            parent,
            reason,
        } => {
            s.approval
                .reject_child_request(&parent, &uid, &reason)
                .await?;
            println!("Rejected child: {}", uid);
        }
        ChildSubcommand::Pending { parent } => {
            let pending = s.approval.pending_child_requests(&parent).await?;
            print_profiles(&pending, "No children awaiting approval.");
        }
    }
    Ok(())
}

async fn run_user(s: &Services, cmd: UserSubcommand) -> Result<(), Error> {
    match cmd {
        UserSubcommand::Show { uid } => {
            let profile = s
                .store
                .get_profile(&uid)
                .await?
                .ok_or_else(|| Error::not_found(RecordKind::Profile, &uid))?;
            print_profile(&profile);
            match check_access(&profile) {
                Ok(()) => println!("  Proxy access: allowed"),
                Err(e) => println!("  Proxy access: {}", e),
            }
        }
        UserSubcommand::Suspend { uid, actor, reason } => {
            s.approval.suspend_user(&actor, &uid, &reason).await?;
            println!("Suspended: {}", uid);
        }
        UserSubcommand::Unsuspend { uid } => {
            let profile = s.approval.unsuspend_user(&uid).await?;
            println!("Unsuspended: {} ({})", uid, profile.approval_status);
        }
    }
    Ok(())
}

async fn run_invite(s: &Services, cmd: InviteSubcommand) -> Result<(), Error> {
    match cmd {
        InviteSubcommand::Create { family_id } => {
            let invite = s.invites.generate_invite_code(&family_id).await?;
            println!("Invite code: {}", invite.code);
            println!("  Family: {}", invite.family_id);
            println!("  Expires: {}", invite.expires_at.to_rfc3339());
        }
        InviteSubcommand::Check { code } => match s.invites.resolve_invite_code(&code).await? {
            InviteLookup::Valid(family) => {
                println!("Valid invite for:");
                print_family(&family);
            }
            InviteLookup::Expired => println!("Invite code has expired."),
            InviteLookup::NotFound => println!("Invite code not found."),
        },
    }
    Ok(())
}

async fn run_family(s: &Services, cmd: FamilySubcommand) -> Result<(), Error> {
    match cmd {
        FamilySubcommand::Create { parent } => {
            let family = s.families.create_family(&parent).await?;
            print_family(&family);
        }
        FamilySubcommand::Show { family_id, parent } => {
            let family = match (family_id, parent) {
                (Some(id), _) => Some(s.families.get_family(&id).await?),
                (None, Some(parent)) => s.families.get_family_for_parent(&parent).await?,
                (None, None) => {
                    return Err(Error::Validation(
                        "either a family id or --parent is required".into(),
                    ))
                }
            };
            match family {
                Some(family) => print_family(&family),
                None => println!("No family found."),
            }
        }
        FamilySubcommand::Children { family_id } => {
            let children = s.families.get_family_children(&family_id).await?;
            print_profiles(&children, "No children in this family.");
        }
        FamilySubcommand::AddChild { family_id, child } => {
            let family = s.families.add_child_to_family(&family_id, &child).await?;
            print_family(&family);
        }
        FamilySubcommand::RemoveChild { family_id, child } => {
            let family = s
                .families
                .remove_child_from_family(&family_id, &child)
                .await?;
            print_family(&family);
        }
        FamilySubcommand::Set {
            family_id,
            filter_level,
        } => {
            let mut patch = serde_json::Map::new();
            patch.insert(
                "filterLevel".to_string(),
                serde_json::Value::String(filter_level.to_string()),
            );
            let family = s
                .families
                .update_family_settings(&family_id, &patch)
                .await?;
            print_family(&family);
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "famgate_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let path = cli.database.unwrap_or_else(default_database_path);
    let services = Services::open(&path).await?;

    match cli.command {
        Commands::Parent(cmd) => run_parent(&services, cmd.command).await?,
        Commands::Child(cmd) => run_child(&services, cmd.command).await?,
        Commands::User(cmd) => run_user(&services, cmd.command).await?,
        Commands::Invite(cmd) => run_invite(&services, cmd.command).await?,
        Commands::Family(cmd) => run_family(&services, cmd.command).await?,
    }

    Ok(())
}
