//! Win Detection
//!
//! Pure scans over a board snapshot. No I/O and no mutation; the engine
//! calls [`check_win`] after each applied move, [`scan_board`] re-validates
//! whole snapshots in tests and consistency checks.

use serde::{Deserialize, Serialize};

use crate::game::board::{BoardState, Piece, PlayerId, Position};

/// The four axis directions: horizontal, vertical, both diagonals.
const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

/// A detected winning line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinLine {
    /// Winning symbol.
    pub piece: Piece,
    /// Player owning the line.
    pub winner: PlayerId,
    /// The full contiguous run, ordered from the line's low end. At least
    /// the configured win length, possibly longer.
    pub positions: Vec<Position>,
}

/// Verdict of a full-board scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoardVerdict {
    /// No win and free squares remain.
    InPlay,
    /// A winning line exists.
    Win(WinLine),
    /// Every square occupied, no win.
    Draw,
}

/// Check whether the square most recently occupied completes a line of at
/// least the configured win length, extending outward in both directions
/// along each axis. Cost is four direction pairs of length at most N: no
/// full-board rescan.
pub fn check_win(board: &BoardState, last: Position) -> Option<WinLine> {
    let square = board.get(last)?;
    if square.is_empty() {
        return None;
    }

    let needed = board.settings.win_length as usize;

    for (dx, dy) in DIRECTIONS {
        let back = run_from(board, last, -dx, -dy, square.piece);
        let forward = run_from(board, last, dx, dy, square.piece);

        if back.len() + forward.len() + 1 >= needed {
            let mut positions = Vec::with_capacity(back.len() + forward.len() + 1);
            positions.extend(back.into_iter().rev());
            positions.push(last);
            positions.extend(forward);

            return Some(WinLine {
                piece: square.piece,
                winner: square.owner,
                positions,
            });
        }
    }

    None
}

/// Re-validate a reconstructed board by treating every occupied square as a
/// candidate line member. Intended for consistency checks and tests, not the
/// per-move hot path.
pub fn scan_board(board: &BoardState) -> BoardVerdict {
    for pos in board.positions() {
        if board.square_at(pos).is_empty() {
            continue;
        }
        if let Some(line) = check_win(board, pos) {
            return BoardVerdict::Win(line);
        }
    }

    if board.is_full() {
        BoardVerdict::Draw
    } else {
        BoardVerdict::InPlay
    }
}

/// Collect consecutive same-symbol positions walking from `start` (exclusive)
/// in direction `(dx, dy)` until the edge, an empty square, or a mismatch.
fn run_from(board: &BoardState, start: Position, dx: i32, dy: i32, piece: Piece) -> Vec<Position> {
    let mut positions = Vec::new();
    let mut x = start.x as i32 + dx;
    let mut y = start.y as i32 + dy;

    while board.in_bounds(x, y) {
        let pos = Position::new(x as u8, y as u8);
        if board.square_at(pos).piece != piece {
            break;
        }
        positions.push(pos);
        x += dx;
        y += dy;
    }

    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{BoardSquare, GameSettings};
    use proptest::prelude::*;

    fn board(size: u8, win_length: u8) -> BoardState {
        BoardState::new(GameSettings {
            board_size: size,
            win_length,
        })
    }

    fn place(board: &mut BoardState, x: u8, y: u8, piece: Piece, owner: u8) {
        let pos = Position::new(x, y);
        let ply = board.ply;
        board.set_square(
            pos,
            BoardSquare {
                piece,
                owner: PlayerId::new(owner),
                ply,
            },
        );
        board.ply += 1;
    }

    #[test]
    fn test_column_win_reports_line_in_order() {
        let mut b = board(3, 3);
        place(&mut b, 0, 0, Piece::Cross, 1);
        place(&mut b, 1, 0, Piece::Circle, 2);
        place(&mut b, 0, 1, Piece::Cross, 1);
        place(&mut b, 1, 1, Piece::Circle, 2);
        place(&mut b, 0, 2, Piece::Cross, 1);

        let line = check_win(&b, Position::new(0, 2)).unwrap();
        assert_eq!(line.piece, Piece::Cross);
        assert_eq!(line.winner, PlayerId::new(1));
        assert_eq!(
            line.positions,
            vec![Position::new(0, 0), Position::new(0, 1), Position::new(0, 2)]
        );
    }

    #[test]
    fn test_row_win() {
        let mut b = board(3, 3);
        for x in 0..3 {
            place(&mut b, x, 1, Piece::Circle, 2);
        }
        assert!(check_win(&b, Position::new(1, 1)).is_some());
    }

    #[test]
    fn test_diagonal_wins() {
        let mut b = board(4, 3);
        place(&mut b, 0, 0, Piece::Cross, 1);
        place(&mut b, 1, 1, Piece::Cross, 1);
        place(&mut b, 2, 2, Piece::Cross, 1);
        let line = check_win(&b, Position::new(1, 1)).unwrap();
        assert_eq!(
            line.positions,
            vec![Position::new(0, 0), Position::new(1, 1), Position::new(2, 2)]
        );

        let mut b = board(4, 3);
        place(&mut b, 3, 0, Piece::Circle, 2);
        place(&mut b, 2, 1, Piece::Circle, 2);
        place(&mut b, 1, 2, Piece::Circle, 2);
        assert!(check_win(&b, Position::new(2, 1)).is_some());
    }

    #[test]
    fn test_win_completed_in_the_middle() {
        let mut b = board(5, 3);
        place(&mut b, 0, 0, Piece::Cross, 1);
        place(&mut b, 2, 0, Piece::Cross, 1);
        place(&mut b, 1, 0, Piece::Cross, 1);

        let line = check_win(&b, Position::new(1, 0)).unwrap();
        assert_eq!(
            line.positions,
            vec![Position::new(0, 0), Position::new(1, 0), Position::new(2, 0)]
        );
    }

    #[test]
    fn test_overlong_run_reports_full_run() {
        let mut b = board(8, 3);
        for x in 0..5 {
            place(&mut b, x, 4, Piece::Cross, 1);
        }
        let line = check_win(&b, Position::new(2, 4)).unwrap();
        assert_eq!(line.positions.len(), 5);
    }

    #[test]
    fn test_short_line_is_not_a_win() {
        let mut b = board(3, 3);
        place(&mut b, 0, 0, Piece::Cross, 1);
        place(&mut b, 0, 1, Piece::Cross, 1);
        assert!(check_win(&b, Position::new(0, 1)).is_none());
    }

    #[test]
    fn test_opponent_piece_breaks_the_run() {
        let mut b = board(5, 3);
        place(&mut b, 0, 0, Piece::Cross, 1);
        place(&mut b, 1, 0, Piece::Circle, 2);
        place(&mut b, 2, 0, Piece::Cross, 1);
        place(&mut b, 3, 0, Piece::Cross, 1);
        assert!(check_win(&b, Position::new(2, 0)).is_none());
    }

    #[test]
    fn test_empty_square_is_never_a_win() {
        let b = board(3, 3);
        assert!(check_win(&b, Position::new(1, 1)).is_none());
        assert!(check_win(&b, Position::new(9, 9)).is_none());
    }

    #[test]
    fn test_win_length_one() {
        let mut b = board(3, 1);
        place(&mut b, 2, 2, Piece::Cross, 1);
        let line = check_win(&b, Position::new(2, 2)).unwrap();
        assert_eq!(line.positions, vec![Position::new(2, 2)]);
    }

    #[test]
    fn test_scan_finds_win_without_last_move() {
        let mut b = board(4, 3);
        place(&mut b, 1, 0, Piece::Circle, 2);
        place(&mut b, 1, 1, Piece::Circle, 2);
        place(&mut b, 1, 2, Piece::Circle, 2);
        match scan_board(&b) {
            BoardVerdict::Win(line) => assert_eq!(line.piece, Piece::Circle),
            other => panic!("expected win, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_reports_draw_on_full_board() {
        let mut b = board(3, 3);
        let layout = [
            (0, 0, Piece::Cross),
            (1, 0, Piece::Circle),
            (2, 0, Piece::Cross),
            (0, 1, Piece::Cross),
            (1, 1, Piece::Circle),
            (2, 1, Piece::Circle),
            (0, 2, Piece::Circle),
            (1, 2, Piece::Cross),
            (2, 2, Piece::Cross),
        ];
        for (x, y, piece) in layout {
            let owner = if piece == Piece::Cross { 1 } else { 2 };
            place(&mut b, x, y, piece, owner);
        }
        assert_eq!(scan_board(&b), BoardVerdict::Draw);
    }

    #[test]
    fn test_scan_in_play() {
        let mut b = board(3, 3);
        place(&mut b, 0, 0, Piece::Cross, 1);
        assert_eq!(scan_board(&b), BoardVerdict::InPlay);
    }

    proptest! {
        /// A straight run of exactly W symbols is detected from every one of
        /// its squares, along every axis direction.
        #[test]
        fn prop_full_length_run_detected(
            size in 3u8..=12,
            win in 2u8..=5,
            dir in 0usize..4,
            seed_x in 0u8..12,
            seed_y in 0u8..12,
        ) {
            let win = win.min(size);
            let (dx, dy) = DIRECTIONS[dir];

            // Clamp the start so the whole run fits on the board.
            let span = (win - 1) as i32;
            let max_x = size as i32 - 1 - if dx > 0 { span } else { 0 };
            let min_y = if dy < 0 { span } else { 0 };
            let max_y = size as i32 - 1 - if dy > 0 { span } else { 0 };
            prop_assume!(max_x >= 0 && max_y >= min_y);
            let start_x = (seed_x as i32).min(max_x);
            let start_y = ((seed_y as i32).max(min_y)).min(max_y);

            let mut b = board(size, win);
            let mut cells = Vec::new();
            for i in 0..win as i32 {
                let x = (start_x + dx * i) as u8;
                let y = (start_y + dy * i) as u8;
                place(&mut b, x, y, Piece::Cross, 1);
                cells.push(Position::new(x, y));
            }

            for cell in &cells {
                let line = check_win(&b, *cell);
                prop_assert!(line.is_some());
                prop_assert!(line.unwrap().positions.len() >= win as usize);
            }
            prop_assert!(matches!(scan_board(&b), BoardVerdict::Win(_)));
        }

        /// A run one short of W is never reported as a win.
        #[test]
        fn prop_short_run_never_wins(
            size in 3u8..=12,
            win in 3u8..=6,
            dir in 0usize..4,
        ) {
            let win = win.min(size);
            prop_assume!(win >= 2);
            let (dx, dy) = DIRECTIONS[dir];

            let span = (win - 2) as i32;
            let start_x = if dx >= 0 { 0 } else { span };
            let start_y = if dy >= 0 { 0 } else { span };

            let mut b = board(size, win);
            let mut cells = Vec::new();
            for i in 0..(win - 1) as i32 {
                let x = (start_x + dx * i) as u8;
                let y = (start_y + dy * i) as u8;
                place(&mut b, x, y, Piece::Cross, 1);
                cells.push(Position::new(x, y));
            }

            for cell in &cells {
                prop_assert!(check_win(&b, *cell).is_none());
            }
            prop_assert_eq!(scan_board(&b), BoardVerdict::InPlay);
        }
    }
}
