use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gridline::game::{check_win, scan_board};
use gridline::{GameSettings, MatchEngine, Piece, PlayerId, Position};

/// Helper to play a scripted sequence and return the final board snapshot
/// together with the last claimed square.
fn played_board(
    settings: GameSettings,
    moves: &[(u8, u8)],
) -> (gridline::BoardState, Position) {
    let a = PlayerId::new(1);
    let b = PlayerId::new(2);
    let mut engine = MatchEngine::new();
    engine
        .start(&[(a, Piece::Cross), (b, Piece::Circle)], settings, 0)
        .unwrap();

    let mut last = None;
    for (i, &(x, y)) in moves.iter().enumerate() {
        let player = if i % 2 == 0 { a } else { b };
        last = Some(engine.apply_move(player, Position::new(x, y)).unwrap());
    }
    let applied = last.unwrap();
    (applied.board, applied.mv.pos)
}

/// A sequence that fills a 3x3 board without anyone winning.
const DRAW_3X3: [(u8, u8); 9] = [
    (0, 0),
    (1, 1),
    (0, 1),
    (0, 2),
    (2, 0),
    (1, 0),
    (1, 2),
    (2, 1),
    (2, 2),
];

/// Benchmark the last-move check when the move completes a line.
fn bench_check_win_hit(c: &mut Criterion) {
    // Cross takes the left column, Circle fills the middle one.
    let (board, pos) = played_board(
        GameSettings::default(),
        &[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)],
    );

    c.bench_function("check_win_hit_3x3", |b| {
        b.iter(|| check_win(&board, pos));
    });
}

/// Benchmark the last-move check on boards of growing size when no line
/// exists (the common per-move case).
fn bench_check_win_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_win_miss");

    for side in [3u8, 8, 16, 32].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{0}x{0}", side)),
            side,
            |b, &side| {
                let center = side / 2;
                let settings = GameSettings {
                    board_size: side,
                    win_length: 5.min(side),
                };
                // A loose cluster around the center, no line anywhere.
                let (board, pos) = played_board(
                    settings,
                    &[
                        (center, center),
                        (center + 1, center),
                        (center - 1, center - 1),
                        (center + 1, center + 1),
                        (center, center - 1),
                    ],
                );
                b.iter(|| check_win(&board, pos));
            },
        );
    }

    group.finish();
}

/// Benchmark the full-board scan on a drawn board (its worst case: every
/// square occupied and every run has to be walked).
fn bench_scan_board_draw(c: &mut Criterion) {
    let (board, _) = played_board(GameSettings::default(), &DRAW_3X3);

    c.bench_function("scan_board_draw_3x3", |b| {
        b.iter(|| scan_board(&board));
    });
}

/// Benchmark the full-board scan on a large, mostly empty board.
fn bench_scan_board_in_play(c: &mut Criterion) {
    let settings = GameSettings {
        board_size: 16,
        win_length: 5,
    };
    let (board, _) = played_board(
        settings,
        &[(8, 8), (9, 8), (7, 7), (9, 9), (8, 7)],
    );

    c.bench_function("scan_board_in_play_16x16", |b| {
        b.iter(|| scan_board(&board));
    });
}

criterion_group!(win_detection, bench_check_win_hit, bench_check_win_miss);
criterion_group!(board_scans, bench_scan_board_draw, bench_scan_board_in_play);
criterion_main!(win_detection, board_scans);
