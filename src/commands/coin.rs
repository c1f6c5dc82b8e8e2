use std::sync::Arc;

use rand::Rng;

use crate::command::{ArgumentType, BotCommand, CommandDispatcher, CommandNode, RegisterError};

const MAX_COINS: i64 = 100_000;

/// Chance of a coin landing on its edge.
const EDGE_CHANCE: f64 = 2e-12;

pub struct CoinCommand;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Flips {
    pub heads: u64,
    pub tails: u64,
    pub edge: u64,
}

pub fn flip<R: Rng + ?Sized>(count: u64, rng: &mut R) -> Flips {
    let mut flips = Flips::default();
    for _ in 0..count {
        if rng.random_bool(EDGE_CHANCE) {
            flips.edge += 1;
        } else if rng.random_bool(0.5) {
            flips.heads += 1;
        } else {
            flips.tails += 1;
        }
    }
    flips
}

pub fn describe(count: i64, flips: &Flips) -> String {
    let mut out = format!(
        "You flipped {} coin{}.\nHeads: {}, tails: {}.",
        count,
        if count == 1 { "" } else { "s" },
        flips.heads,
        flips.tails
    );
    if flips.edge > 0 {
        out.push_str(&format!("\nAnd {} landed on the edge!", flips.edge));
    }
    out
}

fn run(count: i64) -> String {
    if !(1..=MAX_COINS).contains(&count) {
        return format!("The number of coins must be between 1 and {}.", MAX_COINS);
    }
    describe(count, &flip(count as u64, &mut rand::rng()))
}

impl BotCommand for CoinCommand {
    fn name(&self) -> &str {
        "coin"
    }

    fn description(&self) -> &str {
        "Flip coins"
    }

    fn usage(&self) -> &str {
        "coin            # flip one coin\ncoin <count>    # flip count coins (1-100000)"
    }

    fn register(self: Arc<Self>, dispatcher: &mut CommandDispatcher) -> Result<(), RegisterError> {
        dispatcher.register(
            CommandNode::literal("coin")
                .executes(|ctx| {
                    ctx.source().reply_text(run(1));
                    Ok(())
                })
                .then(
                    CommandNode::argument("count", ArgumentType::Integer).executes(|ctx| {
                        ctx.source().reply_text(run(ctx.integer("count")?));
                        Ok(())
                    }),
                ),
        )
    }
}
