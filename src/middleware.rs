use crate::{async_trait, Result, Session};

/// The next stage of a request pipeline, as seen by
/// [`SessionMiddleware`]. Request and response types are opaque to
/// this crate.
#[async_trait]
pub trait Endpoint<Request: Send + 'static>: Send + Sync {
    /// what the stage produces
    type Output: Send;

    /// handles `request` with access to the active session
    async fn call(&self, session: &mut Session, request: Request) -> Self::Output;
}

/// # Session middleware
///
/// Brackets a pipeline stage with the session lifecycle: the session
/// is started before the stage runs (unless it already is) and saved
/// after it returns, which releases the backing medium.
///
/// ```rust
/// # use scoped_session::{async_trait, Endpoint, Session, SessionMiddleware};
/// struct Hello;
///
/// #[async_trait]
/// impl Endpoint<&'static str> for Hello {
///     type Output = String;
///
///     async fn call(&self, session: &mut Session, name: &'static str) -> String {
///         session.flash().add("greeted", name).unwrap();
///         format!("hello {}", name)
///     }
/// }
///
/// # fn main() -> scoped_session::Result<()> { async_std::task::block_on(async {
/// let mut session = Session::memory();
/// let response = SessionMiddleware::new().handle(&mut session, "chashu", &Hello).await?;
/// assert_eq!(response, "hello chashu");
/// assert!(session.flash().has("greeted")?);
/// # Ok(()) }) }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionMiddleware;

impl SessionMiddleware {
    /// constructs a new SessionMiddleware
    pub fn new() -> Self {
        Self
    }

    /// Runs `next` inside the session lifecycle
    pub async fn handle<Request, E>(
        &self,
        session: &mut Session,
        request: Request,
        next: &E,
    ) -> Result<E::Output>
    where
        Request: Send + 'static,
        E: Endpoint<Request>,
    {
        if !session.is_started() {
            session.start()?;
        }
        let response = next.call(session, request).await;
        session.save()?;
        Ok(response)
    }
}

#[cfg(all(test, feature = "native-adapter"))]
mod tests {
    use super::*;
    use crate::{Error, NativeMedium};

    /// counts visits and leaves a flash message for the next request
    struct Visits;

    #[async_trait]
    impl Endpoint<()> for Visits {
        type Output = (usize, Vec<String>);

        async fn call(&self, session: &mut Session, _: ()) -> Self::Output {
            let visits = session.get_or("visits", 0usize).unwrap() + 1;
            session.insert("visits", visits).unwrap();
            let seen = session.flash().get("last").unwrap();
            session
                .flash()
                .add("last", format!("visit {}", visits))
                .unwrap();
            (visits, seen)
        }
    }

    struct Logout;

    #[async_trait]
    impl Endpoint<()> for Logout {
        type Output = Result<()>;

        async fn call(&self, session: &mut Session, _: ()) -> Result<()> {
            session.destroy()
        }
    }

    fn request_session(medium: &NativeMedium, cookie: Option<&str>) -> Result<Session> {
        let mut session = Session::native(medium.clone());
        if let Some(id) = cookie {
            session.set_id(id)?;
        }
        Ok(session)
    }

    #[async_std::test]
    async fn sessions_span_requests() -> Result<()> {
        let medium = NativeMedium::new();
        let middleware = SessionMiddleware::new();

        let mut session = request_session(&medium, None)?;
        let (visits, seen) = middleware.handle(&mut session, (), &Visits).await?;
        assert_eq!(visits, 1);
        assert!(seen.is_empty());
        assert!(!session.is_started(), "saved after the endpoint");
        let cookie = session.take_cookies().pop().unwrap();

        let mut session = request_session(&medium, Some(cookie.value()))?;
        let (visits, seen) = middleware.handle(&mut session, (), &Visits).await?;
        assert_eq!(visits, 2);
        assert_eq!(seen, vec!["visit 1".to_string()]);
        assert!(session.take_cookies().is_empty());
        Ok(())
    }

    #[async_std::test]
    async fn an_already_started_session_is_not_restarted() -> Result<()> {
        let medium = NativeMedium::new();
        let mut session = request_session(&medium, None)?;
        session.start()?;
        let (visits, _) = SessionMiddleware::new()
            .handle(&mut session, (), &Visits)
            .await?;
        assert_eq!(visits, 1);
        Ok(())
    }

    #[async_std::test]
    async fn destroying_inside_the_pipeline() -> Result<()> {
        let medium = NativeMedium::new();
        let middleware = SessionMiddleware::new();

        let mut session = request_session(&medium, None)?;
        middleware.handle(&mut session, (), &Visits).await?;
        assert_eq!(medium.count(), 1);

        middleware.handle(&mut session, (), &Logout).await??;
        assert_eq!(medium.count(), 0);
        let expired = session.take_cookies().pop().unwrap();
        assert_eq!(expired.value(), "");
        Ok(())
    }

    #[async_std::test]
    async fn start_failures_propagate() {
        let medium = NativeMedium::new();
        let mut holder = request_session(&medium, None).unwrap();
        holder.start().unwrap();

        let mut session = request_session(&medium, Some(holder.id())).unwrap();
        let result = SessionMiddleware::new()
            .handle(&mut session, (), &Visits)
            .await;
        assert!(matches!(result, Err(Error::Locked)));
    }
}
