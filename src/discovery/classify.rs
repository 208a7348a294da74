//! Device type heuristics.

/// Ports probed on every reachable device, with service names.
pub const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (3306, "MySQL"),
    (1433, "SQL Server"),
    (21, "FTP"),
    (161, "SNMP"),
];

const SECURE_PORTS: &[u16] = &[22, 443, 993, 995];

pub fn service_name(port: u16) -> Option<&'static str> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
}

pub fn is_secure_port(port: u16) -> bool {
    SECURE_PORTS.contains(&port)
}

/// Guess a device type. Hostname keywords win over open ports.
pub fn classify_device(hostname: &str, open_ports: &[u16]) -> &'static str {
    let hostname = hostname.to_lowercase();
    let has = |ports: &[u16]| ports.iter().any(|p| open_ports.contains(p));

    if hostname.contains("router") || hostname.contains("gateway") {
        return "Router/Gateway";
    }
    if hostname.contains("switch") {
        return "Network Switch";
    }
    if hostname.contains("server") || hostname.contains("srv") {
        return "Server";
    }
    if hostname.contains("printer") {
        return "Printer";
    }

    if has(&[80, 443]) {
        return if has(&[22, 3389]) {
            "Web Server"
        } else {
            "Web Service"
        };
    }
    if has(&[3306, 5432, 1433]) {
        return "Database Server";
    }
    if has(&[22, 3389]) {
        return "Server";
    }
    if has(&[161]) {
        return "Network Device";
    }
    if has(&[25, 110, 143]) {
        return "Mail Server";
    }

    if open_ports.is_empty() {
        "Unknown Device"
    } else {
        "Network Device"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_takes_priority() {
        assert_eq!(classify_device("core-ROUTER.lan", &[80, 22]), "Router/Gateway");
        assert_eq!(classify_device("gateway", &[]), "Router/Gateway");
        assert_eq!(classify_device("switch-3f", &[161]), "Network Switch");
        assert_eq!(classify_device("db-srv-01", &[]), "Server");
        assert_eq!(classify_device("printer-lobby", &[80]), "Printer");
    }

    #[test]
    fn test_port_heuristics() {
        assert_eq!(classify_device("host", &[80, 22]), "Web Server");
        assert_eq!(classify_device("host", &[443, 3389]), "Web Server");
        assert_eq!(classify_device("host", &[80]), "Web Service");
        assert_eq!(classify_device("host", &[5432]), "Database Server");
        assert_eq!(classify_device("host", &[22]), "Server");
        assert_eq!(classify_device("host", &[161, 25]), "Network Device");
        assert_eq!(classify_device("host", &[25]), "Mail Server");
        assert_eq!(classify_device("host", &[53]), "Network Device");
        assert_eq!(classify_device("Unknown-10.0.0.9", &[]), "Unknown Device");
    }

    #[test]
    fn test_port_table() {
        assert_eq!(WELL_KNOWN_PORTS.len(), 16);
        assert_eq!(service_name(1433), Some("SQL Server"));
        assert_eq!(service_name(8080), None);
        assert!(is_secure_port(993));
        assert!(!is_secure_port(80));
    }
}
