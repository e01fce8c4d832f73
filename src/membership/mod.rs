//! Domain Membership Manager: provisions and removes this machine's
//! computer account on a domain controller, establishing the machine
//! account secret the secure channel is keyed from.
//!
//! # MSDN
//!
//! * [[MS-SAMR]: Security Account Manager Remote Protocol](https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-samr/4df07fab-1bbc-452f-8e92-7853a3c7e380)

pub mod calls;

use rand::rngs::OsRng;
use rand::Rng;
use zeroize::Zeroizing;

use self::calls::{
    SamrClose, SamrConnect, SamrCreateUser, SamrDeleteUser, SamrLookupDomain, SamrLookupNames, SamrOpenDomain,
    SamrOpenUser, SamrSetUserInfo, ACB_WSTRUST, MAXIMUM_ALLOWED, PASSWORD_BUFFER_SIZE, USER_INFO_CONTROL,
    USER_INFO_PASSWORD,
};
use crate::crypto::{compute_md4, Rc4};
use crate::rpc::{invoke, AdminCredentials, DcLocator, PipeConnector, RemoteCall, RpcHandle, RpcTransport, Sid};
use crate::secret::MachineAccountSecret;
use crate::utils::{string_to_utf16, validate_netbios_name};
use crate::ErrorKind;

pub const SAMR_PIPE: &str = "samr";

const MACHINE_PASSWORD_LENGTH: usize = 14;
const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#$%&*+-=?@_";

/// Joins the domain: creates (or re-uses) the `computer$` account on the
/// controller, sets a fresh random password on it and returns the derived
/// machine account secret for the caller to install into the trust context.
#[tracing::instrument(level = "debug", skip(locator, connector, admin))]
pub fn join<C: PipeConnector, L: DcLocator>(
    locator: &L,
    connector: &C,
    domain: &str,
    computer_name: &str,
    admin: &AdminCredentials,
) -> crate::Result<MachineAccountSecret> {
    validate_netbios_name(domain)?;
    validate_netbios_name(computer_name)?;

    let controller = locator.locate(domain)?;
    let transport = connector.open(&controller, SAMR_PIPE, Some(admin))?;
    let mut session = SamrSession::new(transport);

    let server_handle = session.connect(&controller)?;
    let sid = session.lookup_domain(server_handle, domain)?;
    let domain_handle = session.open_domain(server_handle, &sid)?;

    let account_name = format!("{}$", computer_name);
    let user_handle = match session.create_user(domain_handle, &account_name) {
        Ok(handle) => handle,
        Err(err) if err.error_type == ErrorKind::UserExists => {
            debug!(account = %account_name, "computer account already exists, re-joining");

            let rid = session.lookup_name(domain_handle, &account_name)?;
            session.open_user(domain_handle, rid)?
        }
        Err(err) => return Err(err),
    };

    let password = generate_machine_password();
    let secret = compute_md4(&string_to_utf16(&password));

    let buffer = encode_password_buffer(&password);
    let transport_key = session.transport_key()?;
    let encrypted = Rc4::new(&transport_key).process(&buffer[..]);
    session.set_user_info(user_handle, USER_INFO_PASSWORD, encrypted)?;

    session.set_user_info(user_handle, USER_INFO_CONTROL, ACB_WSTRUST.to_le_bytes().to_vec())?;

    session.finish()?;

    info!(domain = %domain, account = %account_name, "joined domain");

    Ok(MachineAccountSecret::new(secret))
}

/// Leaves the domain: deletes this machine's `computer$` account. The caller
/// clears the machine secret from the trust context afterwards.
#[tracing::instrument(level = "debug", skip(locator, connector, admin))]
pub fn leave<C: PipeConnector, L: DcLocator>(
    locator: &L,
    connector: &C,
    domain: &str,
    computer_name: &str,
    admin: &AdminCredentials,
) -> crate::Result<()> {
    validate_netbios_name(domain)?;
    validate_netbios_name(computer_name)?;

    let controller = locator.locate(domain)?;
    let transport = connector.open(&controller, SAMR_PIPE, Some(admin))?;
    let mut session = SamrSession::new(transport);

    let server_handle = session.connect(&controller)?;
    let sid = session.lookup_domain(server_handle, domain)?;
    let domain_handle = session.open_domain(server_handle, &sid)?;

    let account_name = format!("{}$", computer_name);
    let rid = session.lookup_name(domain_handle, &account_name)?;
    let user_handle = session.open_user(domain_handle, rid)?;

    session.delete_user(user_handle)?;
    session.finish()?;

    info!(domain = %domain, account = %account_name, "left domain");

    Ok(())
}

/// One account-management pipe session. Every policy handle it opens is
/// tracked and closed in reverse order, on the success path through
/// `finish` and on every other exit path through `Drop`.
struct SamrSession<T: RpcTransport> {
    transport: T,
    handles: Vec<RpcHandle>,
}

impl<T: RpcTransport> SamrSession<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            handles: Vec::new(),
        }
    }

    fn call<Call: RemoteCall>(&mut self, call: &Call) -> crate::Result<Call::Response> {
        invoke(&mut self.transport, call)
    }

    fn transport_key(&self) -> crate::Result<[u8; crate::SESSION_KEY_SIZE]> {
        self.transport.session_transport_key()
    }

    fn connect(&mut self, server: &str) -> crate::Result<RpcHandle> {
        let response = self.call(&SamrConnect {
            server_name: server.to_owned(),
            desired_access: MAXIMUM_ALLOWED,
        })?;

        self.handles.push(response.handle);

        Ok(response.handle)
    }

    fn lookup_domain(&mut self, server_handle: RpcHandle, domain: &str) -> crate::Result<Sid> {
        Ok(self
            .call(&SamrLookupDomain {
                server_handle,
                domain_name: domain.to_owned(),
            })?
            .sid)
    }

    fn open_domain(&mut self, server_handle: RpcHandle, sid: &Sid) -> crate::Result<RpcHandle> {
        let response = self.call(&SamrOpenDomain {
            server_handle,
            desired_access: MAXIMUM_ALLOWED,
            sid: sid.clone(),
        })?;

        self.handles.push(response.handle);

        Ok(response.handle)
    }

    fn create_user(&mut self, domain_handle: RpcHandle, account_name: &str) -> crate::Result<RpcHandle> {
        let response = self.call(&SamrCreateUser {
            domain_handle,
            account_name: account_name.to_owned(),
            account_type: ACB_WSTRUST,
            desired_access: MAXIMUM_ALLOWED,
        })?;

        self.handles.push(response.handle);

        Ok(response.handle)
    }

    fn lookup_name(&mut self, domain_handle: RpcHandle, account_name: &str) -> crate::Result<u32> {
        Ok(self
            .call(&SamrLookupNames {
                domain_handle,
                account_name: account_name.to_owned(),
            })?
            .rid)
    }

    fn open_user(&mut self, domain_handle: RpcHandle, rid: u32) -> crate::Result<RpcHandle> {
        let response = self.call(&SamrOpenUser {
            domain_handle,
            desired_access: MAXIMUM_ALLOWED,
            rid,
        })?;

        self.handles.push(response.handle);

        Ok(response.handle)
    }

    fn set_user_info(&mut self, user_handle: RpcHandle, level: u16, data: Vec<u8>) -> crate::Result<()> {
        self.call(&SamrSetUserInfo {
            user_handle,
            level,
            data,
        })?;

        Ok(())
    }

    /// Deleting the account also destroys its handle on the server, so the
    /// handle leaves the close stack here.
    fn delete_user(&mut self, user_handle: RpcHandle) -> crate::Result<()> {
        self.call(&SamrDeleteUser { user_handle })?;
        self.handles.retain(|handle| *handle != user_handle);

        Ok(())
    }

    /// Closes all tracked handles in reverse order. A close failure leaves
    /// the remaining handles for `Drop` to attempt.
    fn finish(&mut self) -> crate::Result<()> {
        while let Some(handle) = self.handles.pop() {
            if let Err(err) = self.call(&SamrClose { handle }) {
                self.handles.push(handle);

                return Err(err);
            }
        }

        Ok(())
    }
}

impl<T: RpcTransport> Drop for SamrSession<T> {
    fn drop(&mut self) {
        while let Some(handle) = self.handles.pop() {
            if let Err(err) = invoke(&mut self.transport, &SamrClose { handle }) {
                warn!(error = %err, "failed to close a policy handle");
            }
        }
    }
}

fn generate_machine_password() -> Zeroizing<String> {
    let mut password = Zeroizing::new(String::with_capacity(MACHINE_PASSWORD_LENGTH));

    for _ in 0..MACHINE_PASSWORD_LENGTH {
        let index = OsRng.gen_range(0..PASSWORD_CHARSET.len());
        password.push(char::from(PASSWORD_CHARSET[index]));
    }

    password
}

/// Lays out the password-set buffer: the UTF-16LE password right-aligned
/// against offset 512, random fill before it, and the byte length as a
/// trailing little-endian word.
fn encode_password_buffer(password: &str) -> Zeroizing<[u8; PASSWORD_BUFFER_SIZE]> {
    let encoded = Zeroizing::new(string_to_utf16(password));
    let mut buffer = Zeroizing::new([0x00; PASSWORD_BUFFER_SIZE]);

    let pad = PASSWORD_BUFFER_SIZE - 4 - encoded.len();
    OsRng.fill(&mut buffer[..pad]);
    buffer[pad..PASSWORD_BUFFER_SIZE - 4].copy_from_slice(&encoded);
    buffer[PASSWORD_BUFFER_SIZE - 4..].copy_from_slice(&(encoded.len() as u32).to_le_bytes());

    buffer
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::rpc::RpcTransport;
    use crate::{Error, SESSION_KEY_SIZE};

    #[test]
    fn machine_password_length_and_charset() {
        let password = generate_machine_password();

        assert_eq!(password.len(), MACHINE_PASSWORD_LENGTH);
        assert!(password.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
    }

    #[test]
    fn consecutive_passwords_differ() {
        assert_ne!(*generate_machine_password(), *generate_machine_password());
    }

    #[test]
    fn password_buffer_layout() {
        let buffer = encode_password_buffer("abc");
        let encoded = string_to_utf16("abc");

        assert_eq!(buffer[512 - encoded.len()..512], encoded[..]);
        assert_eq!(buffer[512..], 6u32.to_le_bytes());
    }

    struct UnusedTransport;

    impl RpcTransport for UnusedTransport {
        fn transact(&mut self, _opnum: u16, _request: &[u8]) -> crate::Result<Vec<u8>> {
            panic!("transport must not be reached");
        }

        fn session_transport_key(&self) -> crate::Result<[u8; SESSION_KEY_SIZE]> {
            panic!("transport must not be reached");
        }
    }

    struct CountingConnector {
        opens: Cell<u32>,
    }

    impl PipeConnector for CountingConnector {
        type Transport = UnusedTransport;

        fn open(&self, _server: &str, _pipe: &str, _credentials: Option<&AdminCredentials>) -> crate::Result<Self::Transport> {
            self.opens.set(self.opens.get() + 1);

            Ok(UnusedTransport)
        }
    }

    struct UnusedLocator;

    impl DcLocator for UnusedLocator {
        fn locate(&self, domain: &str) -> crate::Result<String> {
            Ok(format!("DC.{}", domain))
        }
    }

    #[test]
    fn oversized_computer_name_is_rejected_before_any_network_call() {
        let connector = CountingConnector { opens: Cell::new(0) };
        let admin = AdminCredentials::new("Administrator", "CORP", "hunter2");

        let err = join(&UnusedLocator, &connector, "CORP", "ABCDEFGHIJKLMNOPQRST", &admin).unwrap_err();

        assert_eq!(err.error_type, ErrorKind::InvalidParameter);
        assert_eq!(connector.opens.get(), 0);
    }

    #[test]
    fn oversized_domain_name_is_rejected_on_leave() {
        let connector = CountingConnector { opens: Cell::new(0) };
        let admin = AdminCredentials::new("Administrator", "CORP", "hunter2");

        let err = leave(&UnusedLocator, &connector, "ADOMAINNAMETOOLONG", "SRV01", &admin).unwrap_err();

        assert_eq!(err.error_type, ErrorKind::InvalidParameter);
        assert_eq!(connector.opens.get(), 0);
    }

    fn unused_error() -> Error {
        Error::new(ErrorKind::Unsuccessful, "unused")
    }

    struct ScriptedTransport {
        responses: Vec<(u16, Vec<u8>)>,
        cursor: std::rc::Rc<Cell<usize>>,
    }

    impl RpcTransport for ScriptedTransport {
        fn transact(&mut self, opnum: u16, _request: &[u8]) -> crate::Result<Vec<u8>> {
            let (expected, response) = self.responses.get(self.cursor.get()).ok_or_else(unused_error)?;
            assert_eq!(opnum, *expected, "unexpected call order");
            self.cursor.set(self.cursor.get() + 1);

            Ok(response.clone())
        }

        fn session_transport_key(&self) -> crate::Result<[u8; SESSION_KEY_SIZE]> {
            Ok([0x5A; SESSION_KEY_SIZE])
        }
    }

    fn handle_response(tag: u8) -> Vec<u8> {
        let mut buf = [tag; 24].to_vec();
        buf[20..].copy_from_slice(&0u32.to_le_bytes());

        buf
    }

    fn status_response(status: u32) -> Vec<u8> {
        status.to_le_bytes().to_vec()
    }

    #[test]
    fn failed_session_closes_opened_handles_in_reverse_order() {
        // Connect and OpenDomain succeed, CreateUser fails; Drop must close
        // the domain handle first, then the server handle.
        let cursor = std::rc::Rc::new(Cell::new(0));
        let transport = ScriptedTransport {
            responses: vec![
                (SamrConnect::OPNUM, handle_response(0xA1)),
                (SamrOpenDomain::OPNUM, handle_response(0xB2)),
                (SamrCreateUser::OPNUM, {
                    let mut buf = handle_response(0x00);
                    buf.extend_from_slice(&(ErrorKind::AccessDenied as u32).to_le_bytes());
                    buf
                }),
                (SamrClose::OPNUM, status_response(0)),
                (SamrClose::OPNUM, status_response(0)),
            ],
            cursor: cursor.clone(),
        };

        let mut session = SamrSession::new(transport);
        let server_handle = session.connect("DC01").unwrap();
        let sid = Sid::new([0, 0, 0, 0, 0, 5], vec![21, 1, 2, 3]);
        let domain_handle = session.open_domain(server_handle, &sid).unwrap();

        let err = session.create_user(domain_handle, "SRV01$").unwrap_err();
        assert_eq!(err.error_type, ErrorKind::AccessDenied);

        drop(session);

        // Both closes were issued, in the order the script demands.
        assert_eq!(cursor.get(), 5);
    }
}
