use std::sync::Arc;

use rand::Rng;

use crate::command::{ArgumentType, BotCommand, CommandDispatcher, CommandNode, RegisterError};

const MAX_DICE: i64 = 100_000;

pub struct DiceCommand;

/// Roll `count` six-sided dice and describe the result.
pub fn roll<R: Rng + ?Sized>(count: i64, rng: &mut R) -> String {
    if !(1..=MAX_DICE).contains(&count) {
        return format!("The number of dice must be between 1 and {}.", MAX_DICE);
    }
    if count == 1 {
        return format!("You rolled 1 die.\nIt landed on... {}!", rng.random_range(1..=6u32));
    }

    let mut faces = [0u64; 6];
    for _ in 0..count {
        faces[rng.random_range(0..6usize)] += 1;
    }
    let sum: u64 = faces
        .iter()
        .enumerate()
        .map(|(i, n)| (i as u64 + 1) * n)
        .sum();
    let counts: Vec<String> = faces
        .iter()
        .enumerate()
        .map(|(i, n)| format!("{}: {}", i + 1, n))
        .collect();

    format!(
        "You rolled {} dice.\nFaces: {}.\nTotal: {}!",
        count,
        counts.join(", "),
        sum
    )
}

impl BotCommand for DiceCommand {
    fn name(&self) -> &str {
        "dice"
    }

    fn description(&self) -> &str {
        "Roll six-sided dice"
    }

    fn usage(&self) -> &str {
        "dice            # roll one die\ndice <count>    # roll count dice (1-100000)"
    }

    fn register(self: Arc<Self>, dispatcher: &mut CommandDispatcher) -> Result<(), RegisterError> {
        dispatcher.register(
            CommandNode::literal("dice")
                .executes(|ctx| {
                    ctx.source().reply_text(roll(1, &mut rand::rng()));
                    Ok(())
                })
                .then(
                    CommandNode::argument("count", ArgumentType::Integer).executes(|ctx| {
                        let count = ctx.integer("count")?;
                        ctx.source().reply_text(roll(count, &mut rand::rng()));
                        Ok(())
                    }),
                ),
        )
    }
}
