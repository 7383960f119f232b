//! Admin slash-commands.
//!
//! Commands are recognised before the classifier runs and are handled in any
//! chat kind, active or not.  Every command except `/start` is admin-only.
//! Execution yields a list of [`Action`]s that the responder performs in
//! order; nothing here talks to the transport directly.

use tracing::{info, warn};

use super::activation::{ActivationController, Resume};
use crate::error::ActivationError;
use super::rules::{self, KeywordRule, RuleRepository};

pub const DENIED: &str = "Sizga bu buyruqni bajarish ruxsat etilmagan.";
pub const ACTIVATED: &str = "Bot aktivlashtirildi. Endi xabarlarni qayta ishlayapti.";
pub const DEACTIVATED: &str = "Bot deaktivlashtirildi. Endi xabarlarni qayta ishlamaydi.";
pub const FAILED: &str = "Xatolik yuz berdi";

const RULE_SEPARATOR: &str = "=>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// `/reactions` with its raw argument list.
    Reactions(Vec<String>),
    TestReaction,
    Rules,
    AddRule(String),
    DelRule(String),
    Replies,
    AddReply(String),
    ClearReplies,
}

impl Command {
    /// Parse `/name[@bot] args…`.  Unknown names yield `None`, and so does
    /// an `@bot` suffix naming someone other than `bot_username`.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = match head.split_once('@') {
            Some((name, addressee)) => {
                if bot_username.is_some_and(|me| !addressee.eq_ignore_ascii_case(me)) {
                    return None;
                }
                name
            }
            None => head,
        };

        let cmd = match name {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "reactions" => Self::Reactions(args.split_whitespace().map(str::to_string).collect()),
            "test_reaction" => Self::TestReaction,
            "rules" => Self::Rules,
            "addrule" => Self::AddRule(args.to_string()),
            "delrule" => Self::DelRule(args.to_string()),
            "replies" => Self::Replies,
            "addreply" => Self::AddReply(args.to_string()),
            "clearreplies" => Self::ClearReplies,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reactions(_) => "reactions",
            Self::TestReaction => "test_reaction",
            Self::Rules => "rules",
            Self::AddRule(_) => "addrule",
            Self::DelRule(_) => "delrule",
            Self::Replies => "replies",
            Self::AddReply(_) => "addreply",
            Self::ClearReplies => "clearreplies",
        }
    }
}

/// One outbound step produced by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Reply(String),
    /// React to the command message itself.
    React(String),
}

pub struct CommandContext<'a> {
    pub activation: &'a ActivationController,
    pub rules: &'a RuleRepository,
    pub greeting: &'a str,
}

pub async fn execute(cmd: &Command, sender: Option<&str>, ctx: &CommandContext<'_>) -> Vec<Action> {
    if let Command::Start = cmd {
        return match ctx.activation.resume(sender).await {
            Ok(Resume::Resumed) => reply(ACTIVATED),
            Ok(Resume::Unchanged) => reply(ctx.greeting),
            Err(e) => {
                warn!(command = cmd.name(), "command failed: {e}");
                reply(FAILED)
            }
        };
    }

    if let Command::Stop = cmd {
        return match ctx.activation.stop(sender).await {
            Ok(()) => reply(DEACTIVATED),
            Err(ActivationError::Denied(_)) => reply(DENIED),
            Err(e @ ActivationError::Store(_)) => {
                warn!(command = cmd.name(), "command failed: {e}");
                reply(FAILED)
            }
        };
    }

    if let Err(denied) = ctx.activation.admins().check(sender, cmd.name()) {
        warn!("{denied}");
        return reply(DENIED);
    }

    let result = match cmd {
        Command::Reactions(args) => reactions(ctx.rules, args).await,
        Command::TestReaction => test_reaction(ctx.rules).await,
        Command::Rules => Ok(list_rules(&ctx.rules.rules().await)),
        Command::AddRule(args) => add_rule(ctx.rules, args).await,
        Command::DelRule(args) => del_rule(ctx.rules, args).await,
        Command::Replies => Ok(list_replies(&ctx.rules.responses().await.question_replies)),
        Command::AddReply(text) => add_reply(ctx.rules, text).await,
        Command::ClearReplies => ctx
            .rules
            .update_responses(|r| r.question_replies.clear())
            .await
            .map(|()| reply("Javoblar tozalandi")),
        Command::Start | Command::Stop => Ok(Vec::new()),
    };

    result.unwrap_or_else(|e| {
        warn!(command = cmd.name(), "command failed: {e}");
        reply(FAILED)
    })
}

type CommandResult = Result<Vec<Action>, crate::error::StoreError>;

fn reply(text: impl Into<String>) -> Vec<Action> {
    vec![Action::Reply(text.into())]
}

async fn reactions(repo: &RuleRepository, args: &[String]) -> CommandResult {
    match args.first().map(String::as_str) {
        None => {
            let glyphs = repo.responses().await.reactions;
            Ok(reply(if glyphs.is_empty() {
                "Hozir reaksiyalar o'chiq".to_string()
            } else {
                format!("Faol reaksiyalar: {}", glyphs.join(" "))
            }))
        }
        Some("off") => {
            repo.update_responses(|r| r.reactions.clear()).await?;
            info!("reactions disabled");
            Ok(reply("Reaksiyalar o'chirildi"))
        }
        Some(_) => {
            let glyphs = args.to_vec();
            let listed = glyphs.join(" ");
            repo.update_responses(move |r| r.reactions = glyphs).await?;
            info!(reactions = %listed, "reactions updated");
            Ok(reply(format!("Yangi reaksiyalar sozlandi: {listed}")))
        }
    }
}

async fn test_reaction(repo: &RuleRepository) -> CommandResult {
    let glyphs = repo.responses().await.reactions;
    let Some(first) = glyphs.first() else {
        return Ok(reply("Reaksiyalar mavjud emas! /reactions buyrug'i bilan sozlang."));
    };
    Ok(vec![
        Action::Reply("Test reaction qo'yishga harakat qilmoqda...".into()),
        Action::React(first.clone()),
        Action::Reply(format!("Test reaction {first} qo'yishga harakat qilindi")),
    ])
}

fn list_rules(rules: &[KeywordRule]) -> Vec<Action> {
    if rules.is_empty() {
        return reply("Qoidalar yo'q");
    }
    let lines: Vec<String> = rules
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {} {RULE_SEPARATOR} {}", i + 1, r.pattern, r.response))
        .collect();
    reply(lines.join("\n"))
}

async fn add_rule(repo: &RuleRepository, args: &str) -> CommandResult {
    let Some((pattern, response)) = args.split_once(RULE_SEPARATOR) else {
        return Ok(reply("Foydalanish: /addrule <pattern> => <javob>"));
    };
    let (pattern, response) = (pattern.trim(), response.trim());
    if pattern.is_empty() || response.is_empty() {
        return Ok(reply("Foydalanish: /addrule <pattern> => <javob>"));
    }
    if let Err(e) = rules::compile_pattern(pattern) {
        return Ok(reply(format!("Noto'g'ri pattern: {e}")));
    }

    let rule = KeywordRule { pattern: pattern.to_string(), response: response.to_string() };
    let position = repo
        .update_rules(move |rules| {
            rules.push(rule);
            rules.len()
        })
        .await?;
    info!(pattern, position, "keyword rule added");
    Ok(reply(format!("Qoida qo'shildi (#{position})")))
}

async fn del_rule(repo: &RuleRepository, args: &str) -> CommandResult {
    let Ok(index) = args.trim().parse::<usize>() else {
        return Ok(reply("Foydalanish: /delrule <raqam>"));
    };
    let removed = repo
        .update_rules(|rules| {
            (1..=rules.len()).contains(&index).then(|| rules.remove(index - 1))
        })
        .await?;
    Ok(match removed {
        Some(rule) => {
            info!(pattern = %rule.pattern, "keyword rule removed");
            reply(format!("Qoida o'chirildi: {}", rule.pattern))
        }
        None => reply("Bunday raqamli qoida yo'q"),
    })
}

fn list_replies(replies: &[String]) -> Vec<Action> {
    if replies.is_empty() {
        return reply("Javoblar yo'q");
    }
    let lines: Vec<String> = replies.iter().enumerate().map(|(i, r)| format!("{}. {r}", i + 1)).collect();
    reply(lines.join("\n"))
}

async fn add_reply(repo: &RuleRepository, text: &str) -> CommandResult {
    let text = text.trim();
    if text.is_empty() {
        return Ok(reply("Foydalanish: /addreply <matn>"));
    }
    let owned = text.to_string();
    repo.update_responses(move |r| r.question_replies.push(owned)).await?;
    Ok(reply("Javob qo'shildi"))
}
