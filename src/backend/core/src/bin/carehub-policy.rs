//! Carehub Policy CLI - manage role assignments in the policy store
//!
//! Operates directly on the PostgreSQL policy store; the server does not
//! need to be running.

use std::sync::Arc;

use anyhow::Result;
use carehub_core::{
    config::DatabaseConfig,
    policy::{IdentityId, PgPolicyStore, PolicyFact, PolicyKind, PolicyStore, RoleQuery, TenantId},
    rbac::{Enforcer, PolicyDecision, PredefinedRole},
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

// ═══════════════════════════════════════════════════════════════════════════════
// CLI Structure
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(
    name = "carehub-policy",
    version,
    about = "Carehub policy store administration",
    long_about = "Grant, revoke and inspect tenant-scoped role assignments, and evaluate access decisions.",
    propagate_version = true
)]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Maximum role hierarchy depth for `roles` and `check`
    #[arg(long, global = true, default_value_t = carehub_core::rbac::DEFAULT_MAX_ROLE_DEPTH)]
    max_depth: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending policy store migrations
    Migrate,

    /// Assign a role to an identity or role within a tenant
    Grant {
        /// Identity id, or a role name for hierarchy edges
        subject: String,
        /// Role to assign
        role: String,
        #[arg(short, long)]
        tenant: String,
    },

    /// Remove a role assignment
    Revoke {
        subject: String,
        role: String,
        #[arg(short, long)]
        tenant: String,
    },

    /// List role assignments in a tenant
    List {
        #[arg(short, long)]
        tenant: String,
        #[arg(short, long)]
        subject: Option<String>,
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Show the effective roles of an identity, hierarchy included
    Roles {
        identity: String,
        #[arg(short, long)]
        tenant: String,
    },

    /// Evaluate whether an identity may perform an action
    Check {
        identity: String,
        #[arg(short, long)]
        tenant: String,
        /// Resource kind, e.g. `patient`
        resource: String,
        /// Action, e.g. `read`
        action: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Data Models
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Tabled)]
struct AssignmentRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Tenant")]
    tenant: String,
}

impl From<PolicyFact> for AssignmentRow {
    fn from(fact: PolicyFact) -> Self {
        let [subject, role, tenant] = fact.fields;
        Self { subject, role, tenant }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Predefined")]
    predefined: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    identity: String,
    tenant: String,
    resource: String,
    action: String,
    allowed: bool,
    granted_by: Option<String>,
    reason: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Output Helpers
// ═══════════════════════════════════════════════════════════════════════════════

struct OutputHelper {
    format: OutputFormat,
}

impl OutputHelper {
    fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    fn print_success(&self, message: &str) {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "status": "success", "message": message })),
            OutputFormat::Table => println!("{} {}", "[OK]".green().bold(), message),
        }
    }

    fn print_error(&self, message: &str) {
        match self.format {
            OutputFormat::Json => eprintln!("{}", serde_json::json!({ "status": "error", "message": message })),
            OutputFormat::Table => eprintln!("{} {}", "[ERROR]".red().bold(), message),
        }
    }

    fn print_rows<T: Tabled + Serialize>(&self, rows: &[T]) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
            OutputFormat::Table => {
                if rows.is_empty() {
                    println!("{}", "No results found.".dimmed());
                    return Ok(());
                }
                let table = Table::new(rows)
                    .with(Style::rounded())
                    .with(Modify::new(Columns::first()).with(Alignment::left()))
                    .to_string();
                println!("{}", table);
            }
        }
        Ok(())
    }

    fn print_check(&self, result: &CheckResult) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
            OutputFormat::Table => {
                let verdict = if result.allowed {
                    "ALLOW".green().bold()
                } else {
                    "DENY".red().bold()
                };
                println!(
                    "{} {} {}:{} in {}",
                    verdict, result.identity, result.resource, result.action, result.tenant
                );
                if let Some(role) = &result.granted_by {
                    println!("  {}: {}", "granted by".cyan(), role);
                }
                if let Some(reason) = &result.reason {
                    println!("  {}: {}", "reason".cyan(), reason);
                }
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Command Handlers
// ═══════════════════════════════════════════════════════════════════════════════

async fn connect(database_url: Option<String>) -> Result<PgPolicyStore> {
    let url = database_url.ok_or_else(|| anyhow::anyhow!("--database-url or DATABASE_URL is required"))?;
    Ok(PgPolicyStore::connect(&DatabaseConfig::with_url(url)).await?)
}

async fn run(cli: Cli, output: &OutputHelper) -> Result<()> {
    let store = connect(cli.database_url).await?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await?;
            output.print_success("Policy store migrations applied");
        }

        Commands::Grant { subject, role, tenant } => {
            store.insert(&PolicyFact::grouping(&subject, &role, &tenant)).await?;
            output.print_success(&format!("Granted {} to {} in {}", role, subject, tenant));
        }

        Commands::Revoke { subject, role, tenant } => {
            store.remove(&PolicyFact::grouping(&subject, &role, &tenant)).await?;
            output.print_success(&format!("Revoked {} from {} in {}", role, subject, tenant));
        }

        Commands::List { tenant, subject, role } => {
            anyhow::ensure!(!tenant.is_empty(), "--tenant must not be empty");
            let filter = RoleQuery {
                kind: PolicyKind::grouping(),
                subject: subject.unwrap_or_default(),
                role: role.unwrap_or_default(),
                tenant,
            };
            let rows: Vec<AssignmentRow> = store.query(&filter).await?.into_iter().map(Into::into).collect();
            output.print_rows(&rows)?;
        }

        Commands::Roles { identity, tenant } => {
            let enforcer = enforcer(store, cli.max_depth);
            let roles = enforcer
                .roles_of(&IdentityId::new(identity), &TenantId::new(tenant))
                .await?;
            let rows: Vec<RoleRow> = roles
                .into_iter()
                .map(|role| RoleRow {
                    predefined: PredefinedRole::from_id(role.as_str())
                        .map(|p| p.name().to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    role: role.0,
                })
                .collect();
            output.print_rows(&rows)?;
        }

        Commands::Check {
            identity,
            tenant,
            resource,
            action,
        } => {
            let enforcer = enforcer(store, cli.max_depth);
            let decision = enforcer
                .check(&IdentityId::new(&identity), &TenantId::new(&tenant), &resource, &action)
                .await?;
            let (granted_by, reason) = match &decision {
                PolicyDecision::Allow(role) => (Some(role.to_string()), None),
                PolicyDecision::Deny(reason) => (None, Some(reason.clone())),
            };
            output.print_check(&CheckResult {
                allowed: decision.is_allowed(),
                identity,
                tenant,
                resource,
                action,
                granted_by,
                reason,
            })?;
        }
    }

    Ok(())
}

fn enforcer(store: PgPolicyStore, max_depth: usize) -> Enforcer {
    Enforcer::new(Arc::new(store), PredefinedRole::default_capabilities()).with_max_depth(max_depth)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Entry Point
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let output = OutputHelper::new(cli.format, cli.no_color);

    if let Err(e) = run(cli, &output).await {
        output.print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
