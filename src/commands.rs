use std::fmt;

use quarry_core::{BlockPos, BlockType, ChunkPos, Enchant, EnchantKind, PlayerId, ToolUid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CommandError {}

/// Flag change requested by `/flag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagChange {
    Toggle,
    Set(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineCommand {
    /// Turn an existing region into a mine, or create both from corners.
    Create {
        name: String,
        corners: Option<(BlockPos, BlockPos)>,
    },
    Palette {
        name: String,
        blocks: Vec<BlockType>,
    },
    Fill {
        name: String,
    },
    /// Interval 0 selects the configured default.
    Schedule {
        name: String,
        interval_secs: u64,
    },
    Cancel {
        name: String,
    },
    Status {
        name: String,
    },
    Delete {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    Help,
    Claim {
        name: String,
        corner1: BlockPos,
        corner2: BlockPos,
    },
    Unclaim {
        name: String,
    },
    Flag {
        region: String,
        flag: String,
        change: FlagChange,
    },
    Mine(MineCommand),
    /// Load every chunk column between two block positions.
    Load {
        from: BlockPos,
        to: BlockPos,
    },
    Unload {
        chunk: ChunkPos,
    },
    /// Put a tool in the player's hand, adding enchants to it.
    Tool {
        player: PlayerId,
        uid: ToolUid,
        enchants: Vec<Enchant>,
    },
    Break {
        player: PlayerId,
        pos: BlockPos,
    },
    Status {
        player: PlayerId,
    },
    Disconnect {
        player: PlayerId,
    },
    Save,
}

pub fn help_lines() -> Vec<String> {
    [
        "/claim <name> <x1> <y1> <z1> <x2> <y2> <z2>",
        "/unclaim <name>",
        "/flag <region> <flag> [on|off]",
        "/mine create <name> [<x1> <y1> <z1> <x2> <y2> <z2>]",
        "/mine palette <name> <block>...",
        "/mine fill|status|cancel|delete <name>",
        "/mine schedule <name> [seconds]",
        "/load <x1> <z1> <x2> <z2>",
        "/unload <chunk_x> <chunk_z>",
        "/tool <player> <uid> [enchant:level]...",
        "/break <player> <x> <y> <z>",
        "/status <player>",
        "/disconnect <player>",
        "/save",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub fn parse_command(input: &str) -> Result<DriverCommand, CommandError> {
    let input = input.trim();
    let input = input.strip_prefix('/').unwrap_or(input).trim();
    if input.is_empty() {
        return Ok(DriverCommand::Help);
    }

    let mut parts = input.split_whitespace();
    let cmd = parts
        .next()
        .ok_or_else(|| CommandError::new("Missing command"))?
        .to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match cmd.as_str() {
        "help" | "?" => Ok(DriverCommand::Help),
        "claim" => {
            if args.len() != 7 {
                return Err(CommandError::new(
                    "Usage: /claim <name> <x1> <y1> <z1> <x2> <y2> <z2>",
                ));
            }
            let (corner1, corner2) = parse_corners(&args[1..])?;
            Ok(DriverCommand::Claim {
                name: args[0].to_string(),
                corner1,
                corner2,
            })
        }
        "unclaim" => Ok(DriverCommand::Unclaim {
            name: single_name(&args, "Usage: /unclaim <name>")?,
        }),
        "flag" => parse_flag_command(&args),
        "mine" => parse_mine_command(&args).map(DriverCommand::Mine),
        "load" => {
            if args.len() != 4 {
                return Err(CommandError::new("Usage: /load <x1> <z1> <x2> <z2>"));
            }
            Ok(DriverCommand::Load {
                from: BlockPos::new(parse_int(args[0])?, 0, parse_int(args[1])?),
                to: BlockPos::new(parse_int(args[2])?, 0, parse_int(args[3])?),
            })
        }
        "unload" => {
            if args.len() != 2 {
                return Err(CommandError::new("Usage: /unload <chunk_x> <chunk_z>"));
            }
            Ok(DriverCommand::Unload {
                chunk: ChunkPos::new(parse_int(args[0])?, parse_int(args[1])?),
            })
        }
        "tool" => parse_tool_command(&args),
        "break" => {
            if args.len() != 4 {
                return Err(CommandError::new("Usage: /break <player> <x> <y> <z>"));
            }
            Ok(DriverCommand::Break {
                player: parse_player(args[0])?,
                pos: BlockPos::new(
                    parse_int(args[1])?,
                    parse_int(args[2])?,
                    parse_int(args[3])?,
                ),
            })
        }
        "status" => {
            if args.len() != 1 {
                return Err(CommandError::new("Usage: /status <player>"));
            }
            Ok(DriverCommand::Status {
                player: parse_player(args[0])?,
            })
        }
        "disconnect" | "quit" => {
            if args.len() != 1 {
                return Err(CommandError::new("Usage: /disconnect <player>"));
            }
            Ok(DriverCommand::Disconnect {
                player: parse_player(args[0])?,
            })
        }
        "save" => Ok(DriverCommand::Save),
        _ => Err(CommandError::new(format!(
            "Unknown command: {cmd}. Try /help"
        ))),
    }
}

fn single_name(args: &[&str], usage: &str) -> Result<String, CommandError> {
    match args {
        [name] => Ok(name.to_string()),
        _ => Err(CommandError::new(usage)),
    }
}

fn parse_int(s: &str) -> Result<i32, CommandError> {
    s.trim()
        .parse::<i32>()
        .map_err(|_| CommandError::new(format!("Invalid coordinate: {s}")))
}

fn parse_player(s: &str) -> Result<PlayerId, CommandError> {
    s.trim()
        .parse::<u64>()
        .map(PlayerId)
        .map_err(|_| CommandError::new(format!("Invalid player id: {s}")))
}

fn parse_corners(args: &[&str]) -> Result<(BlockPos, BlockPos), CommandError> {
    let n: Vec<i32> = args
        .iter()
        .map(|arg| parse_int(arg))
        .collect::<Result<_, _>>()?;
    match n.as_slice() {
        [x1, y1, z1, x2, y2, z2] => Ok((
            BlockPos::new(*x1, *y1, *z1),
            BlockPos::new(*x2, *y2, *z2),
        )),
        _ => Err(CommandError::new("Expected six coordinates")),
    }
}

fn parse_flag_command(args: &[&str]) -> Result<DriverCommand, CommandError> {
    const USAGE: &str = "Usage: /flag <region> <flag> [on|off]";
    let change = match args.len() {
        2 => FlagChange::Toggle,
        3 => match args[2].to_ascii_lowercase().as_str() {
            "on" | "true" | "allow" => FlagChange::Set(true),
            "off" | "false" | "deny" => FlagChange::Set(false),
            _ => return Err(CommandError::new(USAGE)),
        },
        _ => return Err(CommandError::new(USAGE)),
    };
    Ok(DriverCommand::Flag {
        region: args[0].to_string(),
        flag: args[1].to_string(),
        change,
    })
}

fn parse_mine_command(args: &[&str]) -> Result<MineCommand, CommandError> {
    let Some((sub, rest)) = args.split_first() else {
        return Err(CommandError::new(
            "Usage: /mine <create|palette|fill|schedule|cancel|status|delete> <name> ...",
        ));
    };
    let sub = sub.to_ascii_lowercase();
    match sub.as_str() {
        "create" => match rest {
            [name] => Ok(MineCommand::Create {
                name: name.to_string(),
                corners: None,
            }),
            [name, coords @ ..] if coords.len() == 6 => Ok(MineCommand::Create {
                name: name.to_string(),
                corners: Some(parse_corners(coords)?),
            }),
            _ => Err(CommandError::new(
                "Usage: /mine create <name> [<x1> <y1> <z1> <x2> <y2> <z2>]",
            )),
        },
        "palette" => match rest {
            [name, blocks @ ..] => Ok(MineCommand::Palette {
                name: name.to_string(),
                blocks: blocks.iter().map(|b| BlockType::new(b)).collect(),
            }),
            [] => Err(CommandError::new("Usage: /mine palette <name> <block>...")),
        },
        "fill" | "reset" => Ok(MineCommand::Fill {
            name: single_name(rest, "Usage: /mine fill <name>")?,
        }),
        "schedule" => match rest {
            [name] => Ok(MineCommand::Schedule {
                name: name.to_string(),
                interval_secs: 0,
            }),
            [name, secs] => Ok(MineCommand::Schedule {
                name: name.to_string(),
                interval_secs: secs
                    .parse::<u64>()
                    .map_err(|_| CommandError::new("Invalid reset interval"))?,
            }),
            _ => Err(CommandError::new("Usage: /mine schedule <name> [seconds]")),
        },
        "cancel" => Ok(MineCommand::Cancel {
            name: single_name(rest, "Usage: /mine cancel <name>")?,
        }),
        "status" => Ok(MineCommand::Status {
            name: single_name(rest, "Usage: /mine status <name>")?,
        }),
        "delete" | "remove" => Ok(MineCommand::Delete {
            name: single_name(rest, "Usage: /mine delete <name>")?,
        }),
        _ => Err(CommandError::new(format!("Unknown mine command: {sub}"))),
    }
}

fn parse_tool_command(args: &[&str]) -> Result<DriverCommand, CommandError> {
    let [player, uid, enchants @ ..] = args else {
        return Err(CommandError::new(
            "Usage: /tool <player> <uid> [enchant:level]...",
        ));
    };
    let uid = uid
        .parse::<u64>()
        .map(ToolUid)
        .map_err(|_| CommandError::new(format!("Invalid tool uid: {uid}")))?;
    let enchants = enchants
        .iter()
        .map(|token| parse_enchant(token))
        .collect::<Result<_, _>>()?;
    Ok(DriverCommand::Tool {
        player: parse_player(player)?,
        uid,
        enchants,
    })
}

fn parse_enchant(token: &str) -> Result<Enchant, CommandError> {
    let (name, level) = token.split_once(':').unwrap_or((token, "1"));
    let kind = name
        .parse::<EnchantKind>()
        .map_err(|err| CommandError::new(err.to_string()))?;
    let level = level
        .parse::<u8>()
        .map_err(|_| CommandError::new(format!("Invalid enchant level: {level}")))?;
    Ok(Enchant::new(kind, level))
}
