#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the CrowdChess client.
//!
//! Verifies round-trip serialization of every message variant, the
//! `snake_case` type tags and `camelCase` payload fields the backend emits,
//! the sparse-counter semantics (absent = unchanged), and JSON fixtures that
//! match real backend output.

use crowdchess_client::protocol::{
    ClientMessage, GameEndPayload, GameStatus, GameSummary, MoveResultPayload, PlayerStats,
    ServerMessage, StatCounters, VoteUpdatePayload, Winner,
};
use crowdchess_client::{Board, Side};

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

/// Serialize `val` to JSON, then deserialize back to `T` and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

// ════════════════════════════════════════════════════════════════════
// ClientMessage round-trip tests
// ════════════════════════════════════════════════════════════════════

#[test]
fn client_message_join_game_round_trip() {
    let msg = ClientMessage::JoinGame {
        game_id: "G1".into(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""type":"join_game""#));
    assert!(json.contains(r#""gameId":"G1""#));
    let deser: ClientMessage = serde_json::from_str(&json).expect("deserialize");
    assert!(matches!(deser, ClientMessage::JoinGame { game_id } if game_id == "G1"));
}

#[test]
fn client_message_vote_move_round_trip() {
    let msg = ClientMessage::VoteMove {
        game_id: "G1".into(),
        r#move: "e2e4".into(),
        player_id: "0xabc".into(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""type":"vote_move""#));
    assert!(json.contains(r#""move":"e2e4""#));
    assert!(json.contains(r#""playerId":"0xabc""#));
    let deser: ClientMessage = serde_json::from_str(&json).expect("deserialize");
    if let ClientMessage::VoteMove {
        game_id,
        r#move,
        player_id,
    } = deser
    {
        assert_eq!(game_id, "G1");
        assert_eq!(r#move, "e2e4");
        assert_eq!(player_id, "0xabc");
    } else {
        panic!("expected VoteMove variant");
    }
}

#[test]
fn client_message_join_team_round_trip() {
    let msg = ClientMessage::JoinTeam {
        game_id: "G1".into(),
        team: Side::Black,
        player_id: "0xabc".into(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""team":"black""#));
    let deser: ClientMessage = serde_json::from_str(&json).expect("deserialize");
    assert!(matches!(
        deser,
        ClientMessage::JoinTeam {
            team: Side::Black,
            ..
        }
    ));
}

#[test]
fn client_message_unit_variants_round_trip() {
    for (msg, tag) in [
        (ClientMessage::LeaveMatchmaking, r#"{"type":"leave_matchmaking"}"#),
        (ClientMessage::RequestGamesList, r#"{"type":"request_games_list"}"#),
    ] {
        let json = serde_json::to_string(&msg).expect("serialize");
        assert_eq!(json, tag);
        let _deser: ClientMessage = serde_json::from_str(&json).expect("deserialize");
    }
}

#[test]
fn client_message_matchmaking_and_status_round_trip() {
    let msg = ClientMessage::JoinMatchmaking {
        wallet_address: "0xabc".into(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""walletAddress":"0xabc""#));

    let msg = ClientMessage::CheckPlayerStatus {
        game_id: "G1".into(),
        wallet_address: "0xabc".into(),
    };
    let deser = round_trip(&msg);
    assert!(matches!(deser, ClientMessage::CheckPlayerStatus { .. }));

    let msg = ClientMessage::WatchGame {
        game_id: "G1".into(),
    };
    let deser = round_trip(&msg);
    assert!(matches!(deser, ClientMessage::WatchGame { .. }));

    let msg = ClientMessage::GetValidMoves {
        game_id: "G1".into(),
    };
    let deser = round_trip(&msg);
    assert!(matches!(deser, ClientMessage::GetValidMoves { .. }));
}

#[test]
fn client_message_permit_round_trip() {
    let msg = ClientMessage::RequestPermit {
        wallet_address: "0xabc".into(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""type":"request_permit""#));

    let msg = ClientMessage::SubmitPermitSignature {
        wallet_address: "0xabc".into(),
        signature: "0xdeadbeef".into(),
    };
    let deser = round_trip(&msg);
    if let ClientMessage::SubmitPermitSignature { signature, .. } = deser {
        assert_eq!(signature, "0xdeadbeef");
    } else {
        panic!("expected SubmitPermitSignature variant");
    }
}

// ════════════════════════════════════════════════════════════════════
// ServerMessage round-trip tests
// ════════════════════════════════════════════════════════════════════

#[test]
fn server_message_client_connected_round_trip() {
    let msg = ServerMessage::ClientConnected {
        client_id: "conn_1".into(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""clientId":"conn_1""#));
    let deser: ServerMessage = serde_json::from_str(&json).expect("deserialize");
    assert!(matches!(deser, ServerMessage::ClientConnected { .. }));
}

#[test]
fn server_message_match_found_round_trip() {
    let msg = ServerMessage::MatchFound {
        game_id: "G1".into(),
        players: vec!["0xabc".into(), "0xdef".into()],
        assigned_side: Side::White,
    };
    let deser = round_trip(&msg);
    if let ServerMessage::MatchFound {
        players,
        assigned_side,
        ..
    } = deser
    {
        assert_eq!(players.len(), 2);
        assert_eq!(assigned_side, Side::White);
    } else {
        panic!("expected MatchFound variant");
    }
}

#[test]
fn server_message_vote_update_round_trip() {
    let payload = VoteUpdatePayload {
        game_id: "G1".into(),
        votes: [("e2e4".to_string(), 3), ("d2d4".to_string(), 1)]
            .into_iter()
            .collect(),
        counters: StatCounters {
            white_votes: Some(4),
            total_pot: Some(12.5),
            ..StatCounters::default()
        },
    };
    let msg = ServerMessage::VoteUpdate(Box::new(payload));
    let deser = round_trip(&msg);
    if let ServerMessage::VoteUpdate(p) = deser {
        assert_eq!(p.votes.get("e2e4"), Some(&3));
        assert_eq!(p.counters.white_votes, Some(4));
        assert_eq!(p.counters.total_pot, Some(12.5));
        assert_eq!(p.counters.black_votes, None);
    } else {
        panic!("expected VoteUpdate variant");
    }
}

#[test]
fn server_message_move_result_round_trip() {
    let msg = ServerMessage::MoveResult(Box::new(MoveResultPayload {
        game_id: "G1".into(),
        r#move: "e2e4".into(),
        current_turn: Some(Side::Black),
        current_move: Some(2),
        counters: StatCounters::default(),
    }));
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""currentTurn":"black""#));
    assert!(json.contains(r#""currentMove":2"#));
    let deser: ServerMessage = serde_json::from_str(&json).expect("deserialize");
    assert!(matches!(deser, ServerMessage::MoveResult(_)));
}

#[test]
fn server_message_timer_tick_round_trip() {
    let msg = ServerMessage::TimerTick {
        game_id: "G1".into(),
        seconds_left: 7,
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""secondsLeft":7"#));
    let deser: ServerMessage = serde_json::from_str(&json).expect("deserialize");
    assert!(matches!(
        deser,
        ServerMessage::TimerTick { seconds_left: 7, .. }
    ));
}

#[test]
fn server_message_games_list_round_trip() {
    let msg = ServerMessage::GamesList {
        games_list: vec![GameSummary {
            id: "G1".into(),
            status: Some(GameStatus::Active),
            white_players: 4,
            black_players: 3,
            total_pot: 100.0,
            ..GameSummary::default()
        }],
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""gamesList""#));
    assert!(json.contains(r#""whitePlayers":4"#));
    let deser: ServerMessage = serde_json::from_str(&json).expect("deserialize");
    if let ServerMessage::GamesList { games_list } = deser {
        assert_eq!(games_list.len(), 1);
        assert_eq!(games_list[0].status, Some(GameStatus::Active));
    } else {
        panic!("expected GamesList variant");
    }
}

#[test]
fn server_message_game_end_round_trip() {
    let msg = ServerMessage::GameEnd(Box::new(GameEndPayload {
        game_id: "G1".into(),
        winner: Winner::Draw,
        game_end_reason: "stalemate".into(),
        current_move: Some(40),
        player_votes: Some(12),
        white_team_players: vec![PlayerStats {
            wallet_address: "0xabc".into(),
            total_votes: 9,
            total_spent: 4.5,
        }],
        black_team_players: vec![],
        counters: StatCounters {
            total_pot: Some(250.0),
            ..StatCounters::default()
        },
    }));
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""winner":"draw""#));
    assert!(json.contains(r#""gameEndReason":"stalemate""#));
    assert!(json.contains(r#""whiteTeamPlayers""#));
    let deser: ServerMessage = serde_json::from_str(&json).expect("deserialize");
    if let ServerMessage::GameEnd(p) = deser {
        assert_eq!(p.winner, Winner::Draw);
        assert_eq!(p.white_team_players[0].total_votes, 9);
        assert_eq!(p.counters.total_pot, Some(250.0));
    } else {
        panic!("expected GameEnd variant");
    }
}

#[test]
fn server_message_misc_variants_round_trip() {
    let deser = round_trip(&ServerMessage::NumberOfPlayers {
        total_connections: 42,
    });
    assert!(matches!(
        deser,
        ServerMessage::NumberOfPlayers {
            total_connections: 42
        }
    ));

    let deser = round_trip(&ServerMessage::ValidMovesResponse {
        game_id: "G1".into(),
        valid_moves: vec!["e2e4".into(), "g1f3".into()],
    });
    if let ServerMessage::ValidMovesResponse { valid_moves, .. } = deser {
        assert_eq!(valid_moves.len(), 2);
    } else {
        panic!("expected ValidMovesResponse variant");
    }

    let deser = round_trip(&ServerMessage::PermitData {
        permit_data: serde_json::json!({ "domain": { "name": "Vault" } }),
    });
    assert!(matches!(deser, ServerMessage::PermitData { .. }));

    let deser = round_trip(&ServerMessage::Error {
        error: "boom".into(),
    });
    assert!(matches!(deser, ServerMessage::Error { error } if error == "boom"));
}

// ════════════════════════════════════════════════════════════════════
// Player status team encoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn player_status_empty_team_encodes_no_side() {
    let json = r#"{"type":"player_status","gameId":"G1","walletAddress":"0xabc","team":""}"#;
    let deser: ServerMessage = serde_json::from_str(json).expect("deserialize");
    if let ServerMessage::PlayerStatus { team, .. } = deser {
        assert_eq!(team, None);
    } else {
        panic!("expected PlayerStatus variant");
    }

    let msg = ServerMessage::PlayerStatus {
        game_id: "G1".into(),
        wallet_address: "0xabc".into(),
        team: None,
    };
    let out = serde_json::to_string(&msg).expect("serialize");
    assert!(out.contains(r#""team":"""#));
}

#[test]
fn player_status_sided_team_round_trips() {
    let msg = ServerMessage::PlayerStatus {
        game_id: "G1".into(),
        wallet_address: "0xabc".into(),
        team: Some(Side::White),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains(r#""team":"white""#));
    let deser: ServerMessage = serde_json::from_str(&json).expect("deserialize");
    if let ServerMessage::PlayerStatus { team, .. } = deser {
        assert_eq!(team, Some(Side::White));
    } else {
        panic!("expected PlayerStatus variant");
    }
}

// ════════════════════════════════════════════════════════════════════
// Raw backend fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn backend_vote_update_fixture_parses() {
    // Sparse delta exactly as the backend sends it: only changed counters.
    let json = r#"{
        "type": "vote_update",
        "gameId": "G1",
        "votes": { "e2e4": 3, "g1f3": 1 },
        "whiteVotes": 4,
        "whitePlayers": 7,
        "totalPot": 120.5,
        "playerVotedThisRound": { "0xabc": true }
    }"#;
    let deser: ServerMessage = serde_json::from_str(json).expect("deserialize");
    if let ServerMessage::VoteUpdate(p) = deser {
        assert_eq!(p.game_id, "G1");
        assert_eq!(p.votes.len(), 2);
        assert_eq!(p.counters.white_votes, Some(4));
        assert_eq!(p.counters.white_players, Some(7));
        assert_eq!(p.counters.total_pot, Some(120.5));
        assert_eq!(
            p.counters
                .player_voted_this_round
                .as_ref()
                .and_then(|m| m.get("0xabc")),
            Some(&true)
        );
        // Absent counters stay absent — the mirror must not touch them.
        assert_eq!(p.counters.black_votes, None);
        assert_eq!(p.counters.board, None);
    } else {
        panic!("expected VoteUpdate variant");
    }
}

#[test]
fn backend_move_result_fixture_with_board_parses() {
    let grid = Board::starting().to_wire();
    let json = serde_json::json!({
        "type": "move_result",
        "gameId": "G1",
        "move": "e2e4",
        "currentTurn": "black",
        "currentMove": 2,
        "board": grid,
    })
    .to_string();
    let deser: ServerMessage = serde_json::from_str(&json).expect("deserialize");
    if let ServerMessage::MoveResult(p) = deser {
        assert_eq!(p.r#move, "e2e4");
        assert_eq!(p.current_turn, Some(Side::Black));
        let board = Board::from_wire(p.counters.board.as_ref().expect("board present"));
        assert_eq!(board, Board::starting());
    } else {
        panic!("expected MoveResult variant");
    }
}

#[test]
fn backend_games_list_fixture_with_sparse_entries_parses() {
    // Lobby entries routinely omit most fields.
    let json = r#"{
        "type": "games_list",
        "gamesList": [
            { "id": "G1", "status": "active", "whitePlayers": 3 },
            { "id": "G2" }
        ]
    }"#;
    let deser: ServerMessage = serde_json::from_str(json).expect("deserialize");
    if let ServerMessage::GamesList { games_list } = deser {
        assert_eq!(games_list.len(), 2);
        assert_eq!(games_list[0].status, Some(GameStatus::Active));
        assert_eq!(games_list[0].white_players, 3);
        assert_eq!(games_list[1].status, None);
        assert_eq!(games_list[1].white_players, 0);
    } else {
        panic!("expected GamesList variant");
    }
}

#[test]
fn unknown_type_tag_fails_to_parse() {
    // The connection loop drops these with a warning; the contract here is
    // only that deserialization reports an error instead of misrouting.
    let json = r#"{"type":"brand_new_thing","gameId":"G1"}"#;
    assert!(serde_json::from_str::<ServerMessage>(json).is_err());
}

#[test]
fn board_grid_survives_protocol_round_trip() {
    let board = Board::starting();
    let msg = ServerMessage::VoteUpdate(Box::new(VoteUpdatePayload {
        game_id: "G1".into(),
        votes: Default::default(),
        counters: StatCounters {
            board: Some(board.to_wire()),
            ..StatCounters::default()
        },
    }));
    let deser = round_trip(&msg);
    if let ServerMessage::VoteUpdate(p) = deser {
        let grid = p.counters.board.expect("board present");
        assert_eq!(Board::from_wire(&grid), board);
        assert_eq!(Board::from_wire(&grid).to_wire(), grid);
    } else {
        panic!("expected VoteUpdate variant");
    }
}
