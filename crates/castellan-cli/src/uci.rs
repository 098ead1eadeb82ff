//! The UCI text protocol loop.

use std::io::{self, BufRead, Write};

use castellan_core::movegen;
use castellan_core::options::Options;
use castellan_core::position::Position;
use castellan_core::search::Limits;
use castellan_core::search::threading::ThreadPool;
use castellan_core::moves::Move;
use castellan_core::types::Depth;

const ENGINE_NAME: &str = "Castellan";
const ENGINE_AUTHOR: &str = "the Castellan developers";

pub fn run() {
    let mut options = Options::default();
    let pool = ThreadPool::new(&options);
    let mut pos = Position::startpos();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            continue;
        };

        match command {
            "uci" => {
                println!("id name {} {}", ENGINE_NAME, env!("CARGO_PKG_VERSION"));
                println!("id author {ENGINE_AUTHOR}");
                for option_line in options.uci_lines() {
                    println!("{option_line}");
                }
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "setoption" => {
                // Option changes only apply between searches.
                pool.wait_for_think_finished();
                handle_setoption(&tokens, &mut options);
                pool.read_uci_options(&options);
            }
            "ucinewgame" => pool.wait_for_think_finished(),
            "position" => {
                if let Some(new_pos) = parse_position(&tokens[1..]) {
                    pos = new_pos;
                } else {
                    eprintln!("info string invalid position command");
                }
            }
            "go" => {
                let (limits, search_moves) = parse_go(&tokens[1..], &pos);
                pool.start_thinking(&pos, &limits, &search_moves);
            }
            "stop" => pool.stop_search(),
            "ponderhit" => pool.ponder_hit(),
            "quit" => break,
            _ => eprintln!("info string unknown command: {command}"),
        }
        let _ = io::stdout().flush();
    }

    pool.stop_search();
    pool.wait_for_think_finished();
    pool.exit();
}

fn handle_setoption(tokens: &[&str], options: &mut Options) {
    // setoption name <spaced name> value <value>
    let Some(name_at) = tokens.iter().position(|&t| t == "name") else {
        return;
    };
    let value_at = tokens.iter().position(|&t| t == "value");
    let name_end = value_at.unwrap_or(tokens.len());
    let name = tokens[name_at + 1..name_end].join(" ");
    let value = value_at
        .map(|i| tokens[i + 1..].join(" "))
        .unwrap_or_default();

    if let Err(err) = options.set(&name, &value) {
        eprintln!("info string {err}");
    }
}

fn parse_position(tokens: &[&str]) -> Option<Position> {
    let mut pos;
    let mut rest;

    match tokens.first()? {
        &"startpos" => {
            pos = Position::startpos();
            rest = &tokens[1..];
        }
        &"fen" => {
            let moves_at = tokens.iter().position(|&t| t == "moves");
            let fen_end = moves_at.unwrap_or(tokens.len());
            let fen = tokens[1..fen_end].join(" ");
            pos = Position::from_fen(&fen).ok()?;
            rest = &tokens[fen_end..];
        }
        _ => return None,
    }

    if rest.first() == Some(&"moves") {
        rest = &rest[1..];
        for token in rest {
            let mv = find_move(&pos, token)?;
            pos = pos.do_move(mv);
        }
    }
    Some(pos)
}

/// Resolves UCI move text against the position's legal moves; this is what
/// pins down promotion pieces, castling and en passant without guessing.
fn find_move(pos: &Position, text: &str) -> Option<Move> {
    movegen::legal_moves(pos)
        .iter()
        .copied()
        .find(|m| m.to_uci() == text)
}

fn parse_go(tokens: &[&str], pos: &Position) -> (Limits, Vec<Move>) {
    let mut limits = Limits::default();
    let mut search_moves = Vec::new();

    let mut iter = tokens.iter();
    while let Some(&token) = iter.next() {
        let number = |iter: &mut std::slice::Iter<'_, &str>| -> u64 {
            iter.next().and_then(|t| t.parse().ok()).unwrap_or(0)
        };
        match token {
            "wtime" => limits.time[0] = number(&mut iter),
            "btime" => limits.time[1] = number(&mut iter),
            "winc" => limits.inc[0] = number(&mut iter),
            "binc" => limits.inc[1] = number(&mut iter),
            "movestogo" => limits.movestogo = number(&mut iter) as u32,
            "depth" => limits.depth = number(&mut iter) as Depth,
            "nodes" => limits.nodes = number(&mut iter),
            "movetime" => limits.movetime = number(&mut iter),
            "infinite" => limits.infinite = true,
            "ponder" => limits.ponder = true,
            "searchmoves" => {
                for &move_text in iter.as_slice() {
                    if let Some(mv) = find_move(pos, move_text) {
                        search_moves.push(mv);
                    }
                }
                break;
            }
            _ => {}
        }
    }

    (limits, search_moves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_startpos_with_moves() {
        let pos = parse_position(&["startpos", "moves", "e2e4", "c7c5", "g1f3"]).unwrap();
        assert_eq!(
            pos.to_fen(),
            "rnbqkbnr/pp1ppppp/8/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
    }

    #[test]
    fn position_from_fen() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let pos = parse_position(&["fen", "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R", "w", "KQkq", "-", "0", "1"]).unwrap();
        assert_eq!(pos.to_fen(), fen);
    }

    #[test]
    fn go_parsing_covers_the_clock_and_budgets() {
        let pos = Position::startpos();
        let (limits, search_moves) = parse_go(
            &["wtime", "60000", "btime", "59000", "winc", "1000", "binc", "1000", "movestogo", "40"],
            &pos,
        );
        assert_eq!(limits.time, [60000, 59000]);
        assert_eq!(limits.inc, [1000, 1000]);
        assert_eq!(limits.movestogo, 40);
        assert!(limits.use_time_management());
        assert!(search_moves.is_empty());

        let (limits, _) = parse_go(&["movetime", "2000"], &pos);
        assert_eq!(limits.movetime, 2000);
        assert!(!limits.use_time_management());

        let (limits, search_moves) = parse_go(&["depth", "6", "searchmoves", "e2e4", "d2d4"], &pos);
        assert_eq!(limits.depth, 6);
        assert_eq!(search_moves.len(), 2);
    }

    #[test]
    fn illegal_moves_in_position_are_rejected() {
        assert!(parse_position(&["startpos", "moves", "e2e5"]).is_none());
    }
}
