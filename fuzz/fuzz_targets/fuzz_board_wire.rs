#![no_main]

use libfuzzer_sys::fuzz_target;

use crowdchess_client::Board;

fuzz_target!(|data: &[u8]| {
    // Treat the input as an arbitrary character grid. `from_wire` must never
    // panic, and whatever it accepts must survive a wire round trip.
    if let Ok(s) = std::str::from_utf8(data) {
        let grid: Vec<Vec<String>> = s
            .lines()
            .map(|line| line.split(',').map(str::to_string).collect())
            .collect();
        let board = Board::from_wire(&grid);
        let rewire = board.to_wire();
        assert_eq!(Board::from_wire(&rewire), board);
    }
});
