use crate::error::{DriverResult, WifiError, WifiResult};
use crate::wifi::types::{AuthThreshold, ConnectionConfig};
use crate::wifi::windows::handle::{WlanHandle, check};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::io::Cursor;
use tracing::debug;
use windows::{
    Win32::NetworkManagement::WiFi::*,
    core::{GUID, PCWSTR},
};

/// `authEncryption` pair for a station config.
///
/// An empty passphrase means an open network; otherwise the threshold picks
/// the weakest suite Windows should negotiate.
fn auth_encryption(config: &ConnectionConfig) -> (&'static str, &'static str) {
    if config.password.is_empty() {
        return ("open", "none");
    }
    match config.auth_threshold {
        AuthThreshold::Open | AuthThreshold::Wep => ("shared", "WEP"),
        AuthThreshold::WpaPersonal => ("WPAPSK", "TKIP"),
        AuthThreshold::Wpa2Personal => ("WPA2PSK", "AES"),
        AuthThreshold::Wpa3Personal => ("WPA3SAE", "AES"),
    }
}

/// Render a manual-connect WLAN profile for `config`
pub fn create_profile_xml(config: &ConnectionConfig) -> WifiResult<String> {
    let ssid = config.ssid.as_str();
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)));

    let mut wlan_profile = BytesStart::new("WLANProfile");
    wlan_profile.push_attribute((
        "xmlns",
        "http://www.microsoft.com/networking/WLAN/profile/v1",
    ));
    let _ = writer.write_event(Event::Start(wlan_profile));

    write_element(&mut writer, "name", ssid);

    let _ = writer.write_event(Event::Start(BytesStart::new("SSIDConfig")));
    let _ = writer.write_event(Event::Start(BytesStart::new("SSID")));
    write_element(&mut writer, "name", ssid);
    let _ = writer.write_event(Event::End(BytesEnd::new("SSID")));
    let _ = writer.write_event(Event::End(BytesEnd::new("SSIDConfig")));

    write_element(&mut writer, "connectionType", "ESS");
    write_element(&mut writer, "connectionMode", "manual");

    let _ = writer.write_event(Event::Start(BytesStart::new("MSM")));
    let _ = writer.write_event(Event::Start(BytesStart::new("security")));
    let _ = writer.write_event(Event::Start(BytesStart::new("authEncryption")));

    let (auth, cipher) = auth_encryption(config);
    write_element(&mut writer, "authentication", auth);
    write_element(&mut writer, "encryption", cipher);
    write_element(&mut writer, "useOneX", "false");
    let _ = writer.write_event(Event::End(BytesEnd::new("authEncryption")));

    if !config.password.is_empty() {
        let _ = writer.write_event(Event::Start(BytesStart::new("sharedKey")));
        write_element(&mut writer, "keyType", "passPhrase");
        write_element(&mut writer, "protected", "false");
        write_element(&mut writer, "keyMaterial", config.password.expose());
        let _ = writer.write_event(Event::End(BytesEnd::new("sharedKey")));
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("security")));
    let _ = writer.write_event(Event::End(BytesEnd::new("MSM")));
    let _ = writer.write_event(Event::End(BytesEnd::new("WLANProfile")));

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| WifiError::Internal(format!("profile xml: {e}")))
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, value: &str) {
    let _ = writer.write_event(Event::Start(BytesStart::new(name)));
    let _ = writer.write_event(Event::Text(BytesText::new(value)));
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}

/// Install or overwrite a profile on the interface
pub fn set_profile(handle: &WlanHandle, guid: &GUID, xml: &str) -> DriverResult<()> {
    unsafe {
        let xml_wide: Vec<u16> = xml.encode_utf16().chain(std::iter::once(0)).collect();
        let p_profile_xml = PCWSTR(xml_wide.as_ptr());

        let mut reason_code = 0;
        let result = WlanSetProfile(
            handle.as_raw(),
            guid,
            0,
            p_profile_xml,
            None,
            true,
            None,
            &mut reason_code,
        );
        if result != 0 {
            debug!("profile rejected, reason {reason_code}");
        }
        check(result)
    }
}

/// Ask the ACM to connect using the profile named `ssid`
pub fn connect_profile(handle: &WlanHandle, guid: &GUID, ssid: &str) -> DriverResult<()> {
    unsafe {
        let ssid_wide: Vec<u16> = ssid.encode_utf16().chain(std::iter::once(0)).collect();
        let p_profile_name = PCWSTR(ssid_wide.as_ptr());

        let connection_params = WLAN_CONNECTION_PARAMETERS {
            wlanConnectionMode: wlan_connection_mode_profile,
            strProfile: p_profile_name,
            pDot11Ssid: std::ptr::null_mut(),
            pDesiredBssidList: std::ptr::null_mut(),
            dot11BssType: dot11_BSS_type_infrastructure,
            dwFlags: 0,
        };

        check(WlanConnect(handle.as_raw(), guid, &connection_params, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::types::{Passphrase, Ssid};

    fn config(ssid: &str, password: &str, threshold: AuthThreshold) -> ConnectionConfig {
        ConnectionConfig {
            ssid: Ssid::new(ssid).unwrap(),
            password: Passphrase::new(password).unwrap(),
            auth_threshold: threshold,
        }
    }

    #[test]
    fn secured_profile_carries_key_material() {
        let xml = create_profile_xml(&config("Home & Co", "s3cret", AuthThreshold::Wpa2Personal))
            .unwrap();
        assert!(xml.contains("<name>Home &amp; Co</name>"));
        assert!(xml.contains("<authentication>WPA2PSK</authentication>"));
        assert!(xml.contains("<keyMaterial>s3cret</keyMaterial>"));
    }

    #[test]
    fn empty_password_yields_open_profile() {
        let xml = create_profile_xml(&config("Cafe", "", AuthThreshold::Wpa2Personal)).unwrap();
        assert!(xml.contains("<authentication>open</authentication>"));
        assert!(!xml.contains("sharedKey"));
    }
}
