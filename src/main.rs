//! QA pipeline operator CLI.
//!
//! Usage:
//!   qa-pipeline migrate
//!   qa-pipeline add-user --username <name> --role <role> [--email <email>]
//!   qa-pipeline authorize --role <role> --kind <kind> --action <action>
//!   qa-pipeline run --test-case <id> --actor <id> [--script <id>] [--status <status>] [--notes <text>]
//!   qa-pipeline execute --script <path>
//!   qa-pipeline recover
//!   qa-pipeline worker

use std::env;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use qa_pipeline::auth::{Authorizer, ResourceKind, UnmappedActionPolicy};
use qa_pipeline::config::Config;
use qa_pipeline::db::{self, DbPool};
use qa_pipeline::error::AppError;
use qa_pipeline::models::{Actor, CreateRunRequest, Role, RunStatus};
use qa_pipeline::services::event_broadcaster::next_event;
use qa_pipeline::services::recovery::{self, RecoveryConfig};
use qa_pipeline::services::{
    EventBroadcaster, ExecutionQueue, ProcessRunner, ScriptExecutor, TestRunService,
    resolve_actor, start_execution_workers, start_recovery_task,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL must point at PostgreSQL");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    let policy = config.authz.unmapped_action_policy;
    if policy == UnmappedActionPolicy::Allow {
        warn!(
            target: "infra",
            "Unmapped actions are ALLOWED for every authenticated role; \
             set QAP_UNMAPPED_ACTION_POLICY=deny once all resource kinds are reviewed"
        );
    }
    let authorizer = Authorizer::new(policy);

    match command {
        "migrate" => migrate(&config).await,
        "add-user" => add_user(&config, &args).await,
        "authorize" => authorize(&authorizer, &args),
        "run" => run(&config, authorizer, &args).await,
        "execute" => execute(&config, &args).await,
        "recover" => recover(&config, authorizer).await,
        "worker" => worker(&config, authorizer).await,
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn flag_value(args: &[String], names: &[&str]) -> Option<String> {
    let mut i = 2;
    while i < args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn required_flag(args: &[String], names: &[&str]) -> String {
    match flag_value(args, names) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} is required", names[0]);
            std::process::exit(1);
        }
    }
}

fn parse_id(value: &str, what: &str) -> Uuid {
    match Uuid::parse_str(value) {
        Ok(id) => id,
        Err(_) => {
            eprintln!("Error: invalid {} id '{}'", what, value);
            std::process::exit(1);
        }
    }
}

fn parse_role(value: &str) -> Role {
    match Role::parse(value) {
        Some(role) => role,
        None => {
            eprintln!("Error: unknown role '{}'", value);
            std::process::exit(1);
        }
    }
}

fn exit_with(context: &str, e: &AppError) -> ! {
    eprintln!("{} [{}]: {}", context, e.error_code(), e);
    std::process::exit(1);
}

async fn connect(config: &Config) -> DbPool {
    match DbPool::new(&config.database).await {
        Ok(pool) => pool,
        Err(e) => exit_with("Error connecting to database", &e),
    }
}

async fn migrate(config: &Config) {
    let pool = connect(config).await;
    if let Err(e) = pool.run_migrations().await {
        exit_with("Error running migrations", &e);
    }
    println!("Database is up to date.");
}

async fn add_user(config: &Config, args: &[String]) {
    let username = required_flag(args, &["--username", "-u"]);
    let role = parse_role(&required_flag(args, &["--role", "-r"]));
    let email = flag_value(args, &["--email", "-e"]);

    let pool = connect(config).await;
    match db::users::insert(pool.connection(), &username, email.as_deref(), role).await {
        Ok(user) => println!("Created user {} ({}) with id {}", user.username, user.role, user.id),
        Err(e) => exit_with("Error creating user", &e),
    }
}

fn authorize(authorizer: &Authorizer, args: &[String]) {
    let role = parse_role(&required_flag(args, &["--role", "-r"]));
    let kind = ResourceKind::parse(&required_flag(args, &["--kind", "-k"]));
    let action = required_flag(args, &["--action", "-a"]);

    let actor = Actor::new(Uuid::nil(), role);
    let decision = authorizer.authorize(Some(&actor), &kind, &action);
    match decision.into_result() {
        Ok(()) => println!("allow: {} may {} {}", role, action, kind),
        Err(e) => {
            println!("deny: {}", e);
            std::process::exit(2);
        }
    }
}

async fn run(config: &Config, authorizer: Authorizer, args: &[String]) {
    let test_case_id = parse_id(&required_flag(args, &["--test-case", "-t"]), "test case");
    let actor_id = parse_id(&required_flag(args, &["--actor", "-a"]), "actor");
    let automation_script_id =
        flag_value(args, &["--script", "-s"]).map(|s| parse_id(&s, "automation script"));
    let status = flag_value(args, &["--status"]).map(|s| match RunStatus::parse(&s) {
        Some(status) => status,
        None => {
            eprintln!("Error: unknown run status '{}'", s);
            std::process::exit(1);
        }
    });
    let notes = flag_value(args, &["--notes", "-n"]);

    let pool = connect(config).await;
    let actor = match resolve_actor(&pool, actor_id).await {
        Ok(actor) => actor,
        Err(e) => exit_with("Error resolving actor", &e),
    };

    let events = EventBroadcaster::new();
    let (queue, receiver) = ExecutionQueue::new(config.execution.queue_capacity);
    let service = Arc::new(
        TestRunService::new(pool.clone(), authorizer, events.clone()).with_queue(queue),
    );
    let executor: Arc<dyn ScriptExecutor> = Arc::new(ProcessRunner::new(&config.runner));
    start_execution_workers(receiver, service.clone(), executor, config.execution.workers);

    let request = CreateRunRequest {
        test_case_id,
        automation_script_id,
        status,
        notes,
    };

    let created = match service.create_run(&actor, request).await {
        Ok(created) => created,
        Err(e) => exit_with("Error creating run", &e),
    };
    if created.is_pending() {
        println!("Run {} queued, waiting for the test tool...", created.run.id);
    }

    let completed = match created.wait().await {
        Ok(completed) => completed,
        Err(e) => exit_with("Error executing run", &e),
    };

    match serde_json::to_string_pretty(&completed.run) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing run: {}", e),
    }
    if let Some(change) = completed.status_change {
        println!("Test case status: {} -> {}", change.previous, change.current);
    }
    match completed.escalation {
        Ok(report) => {
            if let Some(ticket) = report.ticket {
                println!("Opened ticket {}: {}", ticket.id, ticket.title);
            }
        }
        Err(e) => {
            // The run itself is recorded; only the cascade failed
            eprintln!("Escalation failed [{}]: {}", e.error_code(), e);
            std::process::exit(2);
        }
    }
}

async fn execute(config: &Config, args: &[String]) {
    let script = required_flag(args, &["--script", "-s"]);
    let runner = ProcessRunner::new(&config.runner);

    match runner.execute(&script).await {
        Ok(result) => {
            println!("status:     {}", result.status);
            println!("duration:   {}s", result.duration_secs);
            if let Some(shot) = &result.screenshot_ref {
                println!("screenshot: {}", shot);
            }
            if let Some(video) = &result.video_ref {
                println!("video:      {}", video);
            }
            if !result.output.is_empty() {
                println!();
                println!("{}", result.output);
            }
            if result.status != RunStatus::Passed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Runner infrastructure failure: {}", e);
            std::process::exit(2);
        }
    }
}

async fn recover(config: &Config, authorizer: Authorizer) {
    let pool = connect(config).await;
    let service = TestRunService::new(pool, authorizer, EventBroadcaster::new());

    match recovery::run_recovery(&service, &RecoveryConfig::from_config(config)).await {
        Ok(summary) => println!(
            "Closed {} abandoned run(s), re-delivered {} escalation(s), {} failed.",
            summary.closed_runs, summary.redelivered, summary.failed_redeliveries
        ),
        Err(e) => exit_with("Error running recovery", &e),
    }
}

async fn worker(config: &Config, authorizer: Authorizer) {
    let pool = connect(config).await;
    let events = EventBroadcaster::new();
    let service = Arc::new(TestRunService::new(pool, authorizer, events.clone()));

    // Log outbound events for collaborators that tail the process output
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        while let Some(message) = next_event(&mut receiver).await {
            match serde_json::to_string(&message) {
                Ok(json) => info!(target: "events", "{}", json),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
        }
    });

    let task = start_recovery_task(service, RecoveryConfig::from_config(config));
    info!("Worker started (environment: {})", config.environment);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    task.abort();
    info!("Worker stopped");
}

fn print_usage() {
    println!(
        r#"
QA pipeline operator CLI

USAGE:
    qa-pipeline <COMMAND> [OPTIONS]

COMMANDS:
    migrate                         Apply pending database migrations
    add-user                        Create a user
        --username, -u <name>
        --role, -r <role>           admin, manager, developer or tester
        --email, -e <email>         (optional)
    authorize                       Evaluate one authorization decision
        --role, -r <role>
        --kind, -k <kind>           e.g. test_run, users, settings
        --action, -a <action>       e.g. create, show, destroy
    run                             Create a run and wait for its outcome
        --test-case, -t <id>
        --actor, -a <id>
        --script, -s <id>           Automation script (omit for manual runs)
        --status <status>           Terminal status of a manual run
        --notes, -n <text>
    execute                         Run one script through the test tool
        --script, -s <path>
    recover                         Close abandoned runs and re-deliver escalations once
    worker                          Run the recovery sweep until Ctrl-C
    help                            Show this help message

ENVIRONMENT:
    RUST_ENV                        development or production
    DATABASE_URL                    postgres://... or sqlite://...
    QAP_RUNNER_PROGRAM              Test tool executable
    QAP_RUNNER_ARGS                 Arguments placed before the script path
    QAP_UNMAPPED_ACTION_POLICY      allow (default) or deny
"#
    );
}
