//! Integration tests for the arena server.
//!
//! These tests validate cross-component interactions and real network
//! behavior: multi-tick simulation scenarios through the controller, and the
//! full login handshake against a live server on a loopback socket.

use server::config::GameConfig;
use server::controller::Controller;
use server::network::Server;
use shared::{
    compute_time_sync, decode, encode, ClientStatus, EntityKind, Key, KeyState, KeyboardEvent,
    Packet,
};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that garbage on the wire never decodes into a packet
    #[test]
    fn malformed_packet_handling() {
        let valid_data = encode(&Packet::Login {
            login: "soldier".to_string(),
        })
        .unwrap();

        let truncated = &valid_data[..valid_data.len() / 2];
        assert!(decode(truncated).is_err(), "truncated packet must not decode");

        let mut corrupted = valid_data.clone();
        corrupted[0] = 0xFF;
        assert!(decode(&corrupted).is_err(), "corrupted tag must not decode");

        assert!(decode(&[]).is_err(), "empty datagram must not decode");
    }

    /// Tests the login length limit at the wire boundary
    #[test]
    fn login_validation_limits() {
        assert!(shared::is_valid_login("a"));
        assert!(shared::is_valid_login(&"x".repeat(shared::MAX_LOGIN_LENGTH)));
        assert!(!shared::is_valid_login(
            &"x".repeat(shared::MAX_LOGIN_LENGTH + 1)
        ));
        assert!(!shared::is_valid_login(""));
    }
}

/// SIMULATION TESTS
mod simulation_tests {
    use super::*;

    /// Holding a movement key for a second of ticks moves the player about
    /// one speed-length away from its spawn point.
    #[test]
    fn player_moves_over_many_ticks() {
        let mut controller = Controller::new(GameConfig::standard());
        let id = controller.on_player_connected();
        let start = controller.world().position_of(id).unwrap();

        controller.on_keyboard_event(
            id,
            KeyboardEvent {
                time: 1,
                key: Key::Right,
                state: KeyState::Pressed,
            },
        );

        let dt = 1.0 / 30.0;
        for tick in 0..30 {
            controller.update(tick * 33, dt);
        }

        let end = controller.world().position_of(id).unwrap();
        let speed = controller.config().player("soldier").speed;
        let moved = end.x - start.x;
        assert!(
            moved > speed * 0.5 && moved < speed * 1.5,
            "expected roughly {} units of travel, got {}",
            speed,
            moved
        );
    }

    /// Critters appear on their own schedule, players or not.
    #[test]
    fn critters_spawn_on_interval() {
        let mut config = GameConfig::standard();
        config.critter_spawn_interval = 5;
        let mut controller = Controller::new(config);

        let dt = 1.0 / 30.0;
        for tick in 0..12 {
            controller.update(tick * 33, dt);
        }

        let world = controller.world();
        let critters = world
            .dynamics()
            .values()
            .filter(|e| e.snapshot(world.physics(), 0).kind == EntityKind::Critter)
            .count();
        assert!(critters >= 2, "expected at least 2 critters, got {}", critters);
    }

    /// A disconnected player is reaped on the next tick and its critters
    /// pick a new target instead of chasing a ghost.
    #[test]
    fn disconnect_cleans_up_player() {
        let mut controller = Controller::new(GameConfig::standard());
        let id = controller.on_player_connected();
        controller.update(0, 1.0 / 30.0);

        controller.on_player_disconnected(id);
        controller.update(33, 1.0 / 30.0);

        assert!(!controller.world().contains(id));
    }
}

/// CLIENT-SERVER INTEGRATION TESTS
mod client_server_tests {
    use super::*;

    async fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buffer = [0u8; 2048];
        let len = timeout(Duration::from_secs(5), socket.recv(&mut buffer))
            .await
            .expect("timed out waiting for server packet")
            .expect("socket receive failed");
        decode(&buffer[0..len]).expect("server sent undecodable packet")
    }

    async fn send_packet(socket: &UdpSocket, packet: &Packet) {
        let data = encode(packet).unwrap();
        socket.send(&data).await.unwrap();
    }

    /// Full login handshake over a real loopback socket: login, clock sync,
    /// synchronization, then periodic entity broadcasts.
    #[tokio::test]
    async fn full_handshake_over_loopback() {
        let mut server = Server::new("127.0.0.1:0", GameConfig::standard())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(async move { server.run().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server_addr).await.unwrap();

        send_packet(
            &client,
            &Packet::Login {
                login: "tester".to_string(),
            },
        )
        .await;

        // The server also broadcasts our own appearance and player info
        // around the options packet, in no guaranteed order.
        let mut player_id = None;
        for _ in 0..8 {
            if let Packet::ClientOptions(options) = recv_packet(&client).await {
                assert!(options.max_health > 0);
                assert!(options.speed > 0.0);
                player_id = Some(options.id);
                break;
            }
        }
        let player_id = player_id.expect("no client options received after login");

        send_packet(&client, &Packet::SyncTimeRequest { client_time: 1000 }).await;
        let mut synced = false;
        for _ in 0..8 {
            if let Packet::SyncTimeResponse {
                client_time,
                server_time,
            } = recv_packet(&client).await
            {
                assert_eq!(client_time, 1000);
                let sync = compute_time_sync(client_time, server_time, 1040);
                assert!(sync.latency >= 0);
                synced = true;
                break;
            }
        }
        assert!(synced, "no time sync response received");

        send_packet(&client, &Packet::ClientStatus(ClientStatus::Synchronized)).await;

        // Expect the resync (player info, statics) followed by broadcast
        // cycles that include our own player entity.
        let mut saw_player_info = false;
        let mut saw_static = false;
        let mut saw_own_update = false;
        for _ in 0..200 {
            match recv_packet(&client).await {
                Packet::PlayerInfo { id, login } => {
                    if id == player_id {
                        assert_eq!(login, "tester");
                        saw_player_info = true;
                    }
                }
                Packet::EntityUpdated(snapshot) => {
                    if snapshot.kind == EntityKind::Wall {
                        saw_static = true;
                    }
                    if snapshot.id == player_id {
                        assert_eq!(snapshot.kind, EntityKind::Player);
                        saw_own_update = true;
                    }
                }
                _ => {}
            }
            if saw_player_info && saw_static && saw_own_update {
                break;
            }
        }
        assert!(saw_player_info, "never received own player info");
        assert!(saw_static, "never received a static entity snapshot");
        assert!(saw_own_update, "never received own entity update");

        send_packet(&client, &Packet::Disconnect).await;
        server_task.abort();
    }

    /// A login retransmitted after the options reply was lost gets the same
    /// options again instead of losing the session.
    #[tokio::test]
    async fn repeated_login_is_answered_idempotently() {
        let mut server = Server::new("127.0.0.1:0", GameConfig::standard())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(async move { server.run().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server_addr).await.unwrap();

        let login = Packet::Login {
            login: "tester".to_string(),
        };

        send_packet(&client, &login).await;
        let mut first_id = None;
        for _ in 0..8 {
            if let Packet::ClientOptions(options) = recv_packet(&client).await {
                first_id = Some(options.id);
                break;
            }
        }
        let first_id = first_id.expect("no client options received after login");

        // Pretend the reply was lost and log in again.
        send_packet(&client, &login).await;
        let mut second_id = None;
        for _ in 0..16 {
            if let Packet::ClientOptions(options) = recv_packet(&client).await {
                second_id = Some(options.id);
                break;
            }
        }
        assert_eq!(second_id, Some(first_id));

        // The session survived: clock sync still works.
        send_packet(&client, &Packet::SyncTimeRequest { client_time: 7 }).await;
        let mut synced = false;
        for _ in 0..16 {
            if let Packet::SyncTimeResponse { client_time, .. } = recv_packet(&client).await {
                assert_eq!(client_time, 7);
                synced = true;
                break;
            }
        }
        assert!(synced, "session lost after repeated login");

        server_task.abort();
    }

    /// The server answers clock sync requests only for logged-in peers.
    #[tokio::test]
    async fn time_sync_requires_login() {
        let mut server = Server::new("127.0.0.1:0", GameConfig::standard())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(async move { server.run().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server_addr).await.unwrap();

        send_packet(&client, &Packet::SyncTimeRequest { client_time: 1 }).await;

        let mut buffer = [0u8; 2048];
        let response = timeout(Duration::from_millis(300), client.recv(&mut buffer)).await;
        assert!(response.is_err(), "server answered an unknown peer");

        server_task.abort();
    }
}
