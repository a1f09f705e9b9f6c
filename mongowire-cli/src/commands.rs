//! Command execution.

use crate::Commands;
use colored::Colorize;
use mongowire_client::bson::{Bson, Document};
use mongowire_client::{Client, FindOptions};
use mongowire_protocol::Namespace;
use serde_json::Value;

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Topology => {
            let topology = client.topology();
            let mut members: Vec<_> = topology.members().collect();
            members.sort_by(|a, b| a.address().cmp(b.address()));

            let mut output = format!(
                "{} ({} member(s))\n",
                "Topology".bold(),
                topology.len()
            );
            for member in members {
                let role = if member.is_primary() {
                    "PRIMARY".green()
                } else {
                    "SECONDARY".yellow()
                };
                let set = member.set_name().unwrap_or("-");
                let marker = if member.address() == topology.default_address() {
                    " *"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "  {} [{}] set: {}{}\n",
                    member.address().cyan(),
                    role,
                    set,
                    marker
                ));
            }
            Ok(output.trim_end().to_string())
        }

        Commands::IsMaster => {
            let reply = client
                .run_command("admin", &mongowire_client::bson::doc! {"isMaster": 1})
                .await?;
            Ok(format_document(reply))
        }

        Commands::Command { database, command } => {
            let command = parse_document_arg(&command)?;
            let reply = client.run_command(&database, &command).await?;
            Ok(format_document(reply))
        }

        Commands::Find {
            namespace,
            filter,
            limit,
            batch_size,
            skip,
            sort,
            slave_ok,
        } => {
            let namespace = Namespace::parse(&namespace)?;
            let filter = filter
                .map(|f| parse_document_arg(&f))
                .transpose()?
                .unwrap_or_default();

            let mut options = FindOptions::new()
                .with_limit(limit)
                .with_batch_size(batch_size)
                .with_skip(skip);
            if let Some(sort) = sort {
                options = options.with_sort(parse_document_arg(&sort)?);
            }
            if slave_ok {
                options = options.slave_ok();
            }

            let collection = client
                .database(&namespace.database)?
                .collection(&namespace.collection);
            let mut cursor = collection.find(filter, options).await?;
            let documents: Vec<Document> = cursor.collect().await?;

            if documents.is_empty() {
                return Ok("No documents found".yellow().to_string());
            }
            let count = documents.len();
            let mut output = String::new();
            for document in documents {
                output.push_str(&format_document(document));
                output.push('\n');
            }
            output.push_str(&format!("{}: {}", "Documents".dimmed(), count));
            Ok(output)
        }

        Commands::Insert {
            namespace,
            documents,
        } => {
            let namespace = Namespace::parse(&namespace)?;
            let documents = documents
                .iter()
                .map(|d| parse_document_arg(d))
                .collect::<Result<Vec<_>, _>>()?;

            let outcome = client
                .database(&namespace.database)?
                .collection(&namespace.collection)
                .insert(&documents)
                .await?;
            Ok(format!(
                "{} {} document(s) into {}",
                "Inserted".green(),
                outcome.n,
                namespace.to_string().cyan()
            ))
        }
    }
}

/// Parses a JSON argument (either inline JSON or @file.json) into a document.
fn parse_document_arg(arg: &str) -> Result<Document, Box<dyn std::error::Error>> {
    let value: Value = if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        serde_json::from_str(arg)?
    };
    json_to_document(value)
}

/// Converts JSON, extended JSON included, into a BSON document.
fn json_to_document(value: Value) -> Result<Document, Box<dyn std::error::Error>> {
    match Bson::try_from(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(format!("expected a JSON object, got {}", other).into()),
    }
}

/// Formats a document as relaxed extended JSON.
fn format_document(document: Document) -> String {
    let value = Bson::Document(document).into_relaxed_extjson();
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}
