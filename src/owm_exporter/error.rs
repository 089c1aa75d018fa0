// owm_exporter - Prometheus metrics exporter for OpenWeatherMap
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use std::error;
use std::fmt;
use std::net::SocketAddr;

/// Errors that prevent the exporter from starting. All of them are fatal.
#[derive(Debug)]
pub enum StartupError {
    InvalidConfig(String),
    Client(reqwest::Error),
    BindFailure(SocketAddr, hyper::Error),
    Server(hyper::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::Client(e) => write!(f, "unable to initialize HTTP client: {}", e),
            Self::BindFailure(addr, e) => write!(f, "unable to bind to {}: {}", addr, e),
            Self::Server(e) => write!(f, "server error: {}", e),
        }
    }
}

impl error::Error for StartupError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidConfig(_) => None,
            Self::Client(e) => Some(e),
            Self::BindFailure(_, e) => Some(e),
            Self::Server(e) => Some(e),
        }
    }
}
