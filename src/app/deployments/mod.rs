pub mod game_server;
