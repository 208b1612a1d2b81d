//! Interactive headless runner: JSON lines in, JSON lines out.

use std::cell::{Cell, RefCell};
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use td_core::config::GameConfig;
use td_core::error::Result as GameResult;
use td_core::events::GameEvent;
use td_core::game::Game;
use td_core::math::from_millis;
use td_core::tower::TowerId;
use td_core::worker::WorkerId;
use tracing::{debug, info, warn};

use crate::protocol::{Command, Response, StateSnapshot};

/// Headless runner configuration.
#[derive(Debug, Clone, Default)]
pub struct HeadlessConfig {
    /// Output state after every `tick` command.
    pub auto_state_output: bool,
    /// Forward game events as `event` lines.
    pub forward_events: bool,
}

/// One game driven by protocol commands.
pub struct HeadlessRunner {
    config: HeadlessConfig,
    game: Game,
    events: Rc<RefCell<Vec<(u64, GameEvent)>>>,
    clock: Rc<Cell<u64>>,
    finished: bool,
}

impl HeadlessRunner {
    /// Build and start a game from `game_config`.
    pub fn new(game_config: GameConfig, config: HeadlessConfig) -> GameResult<Self> {
        let mut game = Game::new(game_config)?;
        let events = Rc::new(RefCell::new(Vec::new()));
        let clock = Rc::new(Cell::new(0));
        if config.forward_events {
            let log = Rc::clone(&events);
            let now = Rc::clone(&clock);
            game.bus_mut().subscribe_all(move |event| {
                log.borrow_mut().push((now.get(), event.clone()));
                Ok(())
            });
        }
        game.start();
        Ok(Self {
            config,
            game,
            events,
            clock,
            finished: false,
        })
    }

    /// The game being driven.
    #[must_use]
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Whether `quit` has been received.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handle one command and return every response line it produces.
    pub fn handle(&mut self, command: Command) -> Vec<Response> {
        let name = command.name();
        let mut responses = vec![self.execute(command)];

        if self.config.auto_state_output && name == "tick" {
            responses.push(Response::State {
                state: StateSnapshot::capture(&self.game),
            });
        }

        let published = std::mem::take(&mut *self.events.borrow_mut());
        responses.extend(
            published
                .into_iter()
                .map(|(tick, event)| Response::Event { tick, event }),
        );
        responses
    }

    /// Handle one raw input line.
    pub fn handle_line(&mut self, line: &str) -> Vec<Response> {
        match Command::from_json(line) {
            Ok(command) => self.handle(command),
            Err(err) => {
                warn!(error = %err, "Unreadable command");
                vec![Response::error(err.to_string(), None)]
            }
        }
    }

    fn execute(&mut self, command: Command) -> Response {
        let name = command.name();
        debug!(cmd = name, "Executing command");
        let result: GameResult<Option<u64>> = match command {
            Command::Tick { count, delta_ms } => {
                let delta = from_millis(delta_ms);
                for _ in 0..count {
                    self.clock.set(self.game.tick_count() + 1);
                    self.game.tick(delta);
                }
                self.clock.set(self.game.tick_count());
                Ok(Some(u64::from(count)))
            }
            Command::Query => {
                return Response::State {
                    state: StateSnapshot::capture(&self.game),
                };
            }
            Command::Build { slot, tower_type } => self
                .game
                .build_tower(slot, tower_type)
                .map(|id| Some(id.raw())),
            Command::Upgrade { tower } => self
                .game
                .upgrade_tower(TowerId::from_raw(tower))
                .map(|rank| Some(u64::from(rank))),
            Command::Sell { tower } => self
                .game
                .sell_tower(TowerId::from_raw(tower))
                .map(|refund| Some(u64::from(refund))),
            Command::Select { tower } => self
                .game
                .select_tower(tower.map(TowerId::from_raw))
                .map(|()| None),
            Command::HireWorker => self.game.hire_worker().map(|id| Some(id.raw())),
            Command::RemoveWorker { worker } => self
                .game
                .remove_worker(WorkerId::from_raw(worker))
                .map(|()| None),
            Command::ChooseAugment { augment } => {
                self.game.choose_augment(augment).map(|()| None)
            }
            Command::Pause => self.game.pause().map(|()| None),
            Command::Resume => self.game.resume().map(|()| None),
            Command::NextRound => self
                .game
                .start_next_round()
                .map(|round| Some(u64::from(round))),
            Command::Quit => {
                self.finished = true;
                return Response::Bye;
            }
        };

        match result {
            Ok(value) => Response::ack(name, value),
            Err(err) => Response::error(err.to_string(), Some(name)),
        }
    }

    /// Run the read-eval-print loop until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(mut self, input: R, mut output: W) -> io::Result<()> {
        info!("Starting interactive session");
        output.write_all(Response::ready(&self.game).to_json_line().as_bytes())?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            for response in self.handle_line(&line) {
                output.write_all(response.to_json_line().as_bytes())?;
            }
            output.flush()?;
            if self.finished {
                break;
            }
        }

        info!(tick = self.game.tick_count(), "Session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use td_core::game::GameQueries;

    use super::*;

    fn runner(forward_events: bool) -> HeadlessRunner {
        HeadlessRunner::new(
            GameConfig::default(),
            HeadlessConfig {
                auto_state_output: false,
                forward_events,
            },
        )
        .expect("default config is valid")
    }

    #[test]
    fn test_build_acks_with_tower_id() {
        let mut runner = runner(false);
        let responses = runner.handle_line(r#"{"cmd":"build","slot":0,"tower_type":"basic"}"#);
        assert!(matches!(
            responses.as_slice(),
            [Response::Ack { value: Some(1), .. }]
        ));
        assert_eq!(runner.game().tower_count(), 1);
    }

    #[test]
    fn test_rejected_action_reports_error() {
        let mut runner = runner(false);
        let responses = runner.handle_line(r#"{"cmd":"upgrade","tower":99}"#);
        match responses.as_slice() {
            [Response::Error { cmd, .. }] => assert_eq!(cmd.as_deref(), Some("upgrade")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_events_forwarded_after_ack() {
        let mut runner = runner(true);
        let responses = runner.handle_line(r#"{"cmd":"hire_worker"}"#);
        assert!(matches!(responses.first(), Some(Response::Ack { .. })));
        assert!(responses.iter().any(|r| matches!(
            r,
            Response::Event {
                event: GameEvent::WorkerHired { .. },
                ..
            }
        )));
    }

    #[test]
    fn test_huge_tick_delta_is_clamped() {
        let mut runner = runner(false);
        let responses =
            runner.handle_line(r#"{"cmd":"tick","count":1,"delta_ms":3000000000}"#);
        assert!(matches!(
            responses.as_slice(),
            [Response::Ack { value: Some(1), .. }]
        ));
        assert_eq!(runner.game().tick_count(), 1);
        assert_eq!(
            runner.game().inter_round_timer(),
            GameConfig::default().first_round_delay - GameConfig::default().max_tick_delta
        );
    }

    #[test]
    fn test_session_loop_until_quit() {
        let input = b"{\"cmd\":\"tick\",\"count\":5}\n{\"cmd\":\"query\"}\n{\"cmd\":\"quit\"}\n{\"cmd\":\"tick\"}\n";
        let mut output = Vec::new();
        runner(false).run(&input[..], &mut output).expect("io");
        let text = String::from_utf8(output).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains(r#""type":"ready""#));
        assert!(lines[2].contains(r#""tick":5"#));
        assert!(lines[3].contains(r#""type":"bye""#));
    }
}
