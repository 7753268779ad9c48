//! Device endpoint descriptors and request URL resolution.

use crate::config::HttpsPolicy;

/// Placeholder for the protocol prefix in command URIs.
pub const PREFIX_PLACEHOLDER: &str = "${prefix}";

/// Path prefix of TWAIN Local commands.
pub const LOCAL_PREFIX: &str = "/privet";

const LOOPBACK: &str = "127.0.0.1";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Route {
    Local {
        ipv4: String,
        link_local: String,
        port: u16,
        tls_advertised: bool,
    },
    Cloud {
        base_url: String,
    },
}

/// Where a device can be reached, as reported by discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceEndpoint {
    route: Route,
}

impl DeviceEndpoint {
    /// A device on the local network.
    ///
    /// `link_local` is the mDNS host name, with or without its trailing dot.
    #[must_use]
    pub fn local(ipv4: impl Into<String>, link_local: impl Into<String>, port: u16) -> Self {
        Self {
            route: Route::Local {
                ipv4: ipv4.into(),
                link_local: link_local.into(),
                port,
                tls_advertised: true,
            },
        }
    }

    /// A device reached through a TWAIN Cloud service at `base_url`.
    #[must_use]
    pub fn cloud(base_url: impl Into<String>) -> Self {
        Self {
            route: Route::Cloud {
                base_url: base_url.into(),
            },
        }
    }

    /// Record whether the device advertised HTTPS support.
    #[must_use]
    pub fn with_tls_advertised(mut self, advertised: bool) -> Self {
        if let Route::Local { tls_advertised, .. } = &mut self.route {
            *tls_advertised = advertised;
        }
        self
    }

    /// Whether requests go through a cloud service.
    #[must_use]
    pub const fn is_cloud(&self) -> bool { matches!(self.route, Route::Cloud { .. }) }

    /// Whether a request under `policy` would use TLS.
    #[must_use]
    pub const fn uses_tls(&self, policy: HttpsPolicy) -> bool {
        match &self.route {
            Route::Local { tls_advertised, .. } => policy.use_tls(*tls_advertised),
            Route::Cloud { .. } => true,
        }
    }

    /// Build the full request URL for a command `uri`.
    ///
    /// The prefix placeholder is dropped for cloud devices and replaced with
    /// the TWAIN Local prefix otherwise. TLS requests address the device by
    /// its link-local name, or `localhost` when it reports the loopback
    /// address; plain requests use its IPv4 address.
    #[must_use]
    pub fn resolve(&self, uri: &str, policy: HttpsPolicy) -> String {
        match &self.route {
            Route::Cloud { base_url } => {
                let path = uri.replace(PREFIX_PLACEHOLDER, "");
                format!("{}{}", base_url.trim_end_matches('/'), rooted(&path))
            }
            Route::Local {
                ipv4,
                link_local,
                port,
                ..
            } => {
                let path = uri.replace(PREFIX_PLACEHOLDER, LOCAL_PREFIX);
                if self.uses_tls(policy) {
                    let host = if ipv4 == LOOPBACK {
                        "localhost"
                    } else if link_local.is_empty() {
                        ipv4.as_str()
                    } else {
                        link_local.trim_end_matches('.')
                    };
                    format!("https://{host}:{port}{}", rooted(&path))
                } else {
                    format!("http://{ipv4}:{port}{}", rooted(&path))
                }
            }
        }
    }
}

fn rooted(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}
